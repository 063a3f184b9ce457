//! The fixed set of supported languages and BCP-47 tag normalization.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the fixed set of languages the relay supports.
///
/// The source this was distilled from threads bare strings through the
/// whole pipeline; the fixed set is small and known ahead of time, so a
/// closed enum gives exhaustiveness checking at call switches (target
/// language fan-out, voice selection) for free.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Language {
    English,
    Hebrew,
    Russian,
}

impl Language {
    pub const ALL: [Language; 3] = [Language::English, Language::Hebrew, Language::Russian];

    /// Full BCP-47 tag used in vendor calls ("short two-letter tags
    /// are mapped through a fixed table to full tags before vendor calls").
    pub const fn bcp47(self) -> &'static str {
        match self {
            Language::English => "en-US",
            Language::Hebrew => "he-IL",
            Language::Russian => "ru-RU",
        }
    }

    /// Short two-letter tag, used as the translation-memory partition key
    /// prefix ("partitioned by the first two characters of the
    /// target-language tag").
    pub const fn short(self) -> &'static str {
        match self {
            Language::English => "en",
            Language::Hebrew => "he",
            Language::Russian => "ru",
        }
    }

    /// Parse a short or full BCP-47 tag into a supported language.
    /// Unsupported or malformed tags return `None`; callers fall back to
    /// the configured `DEFAULT_PARTICIPANT_LANGUAGE`.
    pub fn parse(tag: &str) -> Option<Language> {
        let lower = tag.to_ascii_lowercase();
        let short = lower.split(['-', '_']).next().unwrap_or(&lower);
        match short {
            "en" => Some(Language::English),
            "he" | "iw" => Some(Language::Hebrew),
            "ru" => Some(Language::Russian),
            _ => None,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.bcp47())
    }
}
