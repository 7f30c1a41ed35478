//! Answer language derived from the configured locale
//!
//! Prompts tell the model which language to answer in. Only the primary
//! subtag of a locale matters: `zh-CN`, `zh_TW` and `zh` all answer in
//! Chinese.

use std::fmt;

/// Language the analysts answer in
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Language {
    English,
    Chinese,
    /// Any other locale; the primary subtag is passed through to the model
    Tagged(String),
}

impl Language {
    /// Derive the answer language from a locale tag such as `en-US`
    ///
    /// An empty locale answers in English.
    ///
    /// ```
    /// use analyst_prompt::Language;
    ///
    /// assert_eq!(Language::from_locale("zh-CN"), Language::Chinese);
    /// assert_eq!(Language::from_locale("en_GB").name(), "English");
    /// assert_eq!(Language::from_locale("ja-JP").name(), "ja");
    /// ```
    pub fn from_locale(locale: &str) -> Self {
        let primary = locale
            .trim()
            .split(['-', '_'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();

        match primary.as_str() {
            "" | "en" => Language::English,
            "zh" => Language::Chinese,
            _ => Language::Tagged(primary),
        }
    }

    /// Name used inside prompt templates
    pub fn name(&self) -> &str {
        match self {
            Language::English => "English",
            Language::Chinese => "Chinese",
            Language::Tagged(tag) => tag,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
