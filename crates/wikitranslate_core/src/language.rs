use anyhow::Result;
use serde::Serialize;

use crate::error::TranslatorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LanguageInfo {
    pub key: &'static str,
    /// Interlanguage-link prefix, `None` for languages without a sister wiki.
    pub subtag: Option<&'static str>,
    pub english_name: &'static str,
    pub localized_name: &'static str,
}

impl LanguageInfo {
    const fn new(
        key: &'static str,
        subtag: Option<&'static str>,
        english_name: &'static str,
        localized_name: &'static str,
    ) -> Self {
        Self {
            key,
            subtag,
            english_name,
            localized_name,
        }
    }

    /// Title suffix marking a translation, e.g. ` (Polski)`.
    pub fn title_suffix(&self) -> String {
        format!(" ({})", self.localized_name)
    }
}

/// Language of the source articles every translation is made from.
pub const SOURCE_LANGUAGE: LanguageInfo =
    LanguageInfo::new("English", Some("en"), "English", "English");

pub const LANGUAGES: &[LanguageInfo] = &[
    LanguageInfo::new("Arabic", Some("ar"), "Arabic", "العربية"),
    LanguageInfo::new("Bangla", None, "Bangla", "বাংলা"),
    LanguageInfo::new("Bosnian", Some("bs"), "Bosnian", "Bosanski"),
    LanguageInfo::new("Bulgarian", Some("bg"), "Bulgarian", "Български"),
    LanguageInfo::new("Cantonese", None, "Cantonese", "粵語"),
    LanguageInfo::new("Catalan", Some("ca"), "Catalan", "Català"),
    LanguageInfo::new("ChineseClassical", None, "Chinese (Classical)", "文言文"),
    LanguageInfo::new(
        "ChineseSimplified",
        Some("zh-hans"),
        "Chinese (Simplified)",
        "简体中文",
    ),
    LanguageInfo::new(
        "ChineseTraditional",
        Some("zh-hant"),
        "Chinese (Traditional)",
        "正體中文",
    ),
    LanguageInfo::new("Croatian", Some("hr"), "Croatian", "Hrvatski"),
    LanguageInfo::new("Czech", Some("cs"), "Czech", "Čeština"),
    LanguageInfo::new("Danish", Some("da"), "Danish", "Dansk"),
    LanguageInfo::new("Dutch", Some("nl"), "Dutch", "Nederlands"),
    SOURCE_LANGUAGE,
    LanguageInfo::new("Esperanto", None, "Esperanto", "Esperanto"),
    LanguageInfo::new("Finnish", Some("fi"), "Finnish", "Suomi"),
    LanguageInfo::new("French", Some("fr"), "French", "Français"),
    LanguageInfo::new("German", Some("de"), "German", "Deutsch"),
    LanguageInfo::new("Greek", Some("el"), "Greek", "Ελληνικά"),
    LanguageInfo::new("Hebrew", Some("he"), "Hebrew", "עברית"),
    LanguageInfo::new("Hungarian", Some("hu"), "Hungarian", "Magyar"),
    LanguageInfo::new("Indonesian", Some("id"), "Indonesian", "Bahasa Indonesia"),
    LanguageInfo::new("Italian", Some("it"), "Italian", "Italiano"),
    LanguageInfo::new("Japanese", Some("ja"), "Japanese", "日本語"),
    LanguageInfo::new("Korean", Some("ko"), "Korean", "한국어"),
    LanguageInfo::new("Lithuanian", Some("lt"), "Lithuanian", "Lietuvių"),
    LanguageInfo::new("NorwegianBokmal", None, "Norwegian (Bokmål)", "Norsk Bokmål"),
    LanguageInfo::new("Polish", Some("pl"), "Polish", "Polski"),
    LanguageInfo::new("Portuguese", Some("pt"), "Portuguese", "Português"),
    LanguageInfo::new("Romanian", None, "Romanian", "Română"),
    LanguageInfo::new("Russian", Some("ru"), "Russian", "Русский"),
    LanguageInfo::new("Serbian", Some("sr"), "Serbian", "Српски (Srpski)"),
    LanguageInfo::new("Slovak", Some("sk"), "Slovak", "Slovenčina"),
    LanguageInfo::new("Spanish", Some("es"), "Spanish", "Español"),
    LanguageInfo::new("Swedish", Some("sv"), "Swedish", "Svenska"),
    LanguageInfo::new("Thai", Some("th"), "Thai", "ไทย"),
    LanguageInfo::new("Turkish", Some("tr"), "Turkish", "Türkçe"),
    LanguageInfo::new("Ukrainian", Some("uk"), "Ukrainian", "Українська"),
    LanguageInfo::new("Vietnamese", None, "Vietnamese", "Tiếng Việt"),
    LanguageInfo::new("Quechua", None, "Quechua", "Runa simi"),
];

pub fn lookup(key: &str) -> Result<&'static LanguageInfo> {
    LANGUAGES
        .iter()
        .find(|info| info.key == key)
        .ok_or_else(|| TranslatorError::UnknownLanguage(key.to_string()).into())
}

pub fn known_subtags() -> impl Iterator<Item = &'static str> {
    LANGUAGES.iter().filter_map(|info| info.subtag)
}

fn matching_language(title: &str) -> Option<&'static LanguageInfo> {
    LANGUAGES.iter().find(|info| {
        title
            .strip_suffix(')')
            .and_then(|rest| rest.strip_suffix(info.localized_name))
            .is_some_and(|rest| rest.ends_with(" ("))
    })
}

pub fn is_localized_title(title: &str) -> bool {
    matching_language(title).is_some()
}

pub fn language_of_title(title: &str) -> Option<&'static LanguageInfo> {
    matching_language(title)
}

pub fn strip_localization_suffix(title: &str) -> &str {
    match matching_language(title) {
        Some(info) => {
            let suffix_len = info.localized_name.len() + " ()".len();
            &title[..title.len() - suffix_len]
        }
        None => title,
    }
}

/// Localized title of `title`; every subpage segment carries the suffix.
pub fn localized_title(title: &str, language: &LanguageInfo) -> String {
    let suffix = language.title_suffix();
    title
        .split('/')
        .map(|segment| format!("{segment}{suffix}"))
        .collect::<Vec<_>>()
        .join("/")
}

pub fn english_title_for(title: &str) -> String {
    title
        .split('/')
        .map(strip_localization_suffix)
        .collect::<Vec<_>>()
        .join("/")
}

pub fn title_to_page_name(title: &str) -> String {
    title.trim().replace(' ', "_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn localized_title_detection_is_anchored_at_end() {
        assert!(is_localized_title("Installation guide (Polski)"));
        assert!(is_localized_title("Network (Српски (Srpski))"));
        assert!(!is_localized_title("Installation guide"));
        assert!(!is_localized_title("Installation guide (Polski) notes"));
        assert!(!is_localized_title("Installation guide(Polski)"));
    }

    #[test]
    fn strip_removes_exact_suffix_only() {
        assert_eq!(
            strip_localization_suffix("Installation guide (Polski)"),
            "Installation guide"
        );
        assert_eq!(strip_localization_suffix("Dotfiles"), "Dotfiles");
        assert_eq!(
            strip_localization_suffix("Xorg (Српски (Srpski))"),
            "Xorg"
        );
    }

    #[test]
    fn lookup_rejects_unknown_key() {
        assert_eq!(lookup("Polish").expect("polish").localized_name, "Polski");
        let error = lookup("Klingon").expect_err("must fail");
        assert!(matches!(
            error.downcast_ref::<TranslatorError>(),
            Some(TranslatorError::UnknownLanguage(key)) if key == "Klingon"
        ));
    }

    #[test]
    fn localized_title_handles_subpages() {
        let polish = lookup("Polish").expect("polish");
        assert_eq!(
            localized_title("Installation guide", polish),
            "Installation guide (Polski)"
        );
        let subpage = localized_title("Dotfiles/Examples", polish);
        assert_eq!(subpage, "Dotfiles (Polski)/Examples (Polski)");
        assert_eq!(english_title_for(&subpage), "Dotfiles/Examples");
    }

    #[test]
    fn registry_localized_names_are_distinct() {
        for (index, left) in LANGUAGES.iter().enumerate() {
            for right in &LANGUAGES[index + 1..] {
                assert_ne!(left.localized_name, right.localized_name);
                assert_ne!(left.key, right.key);
            }
        }
        assert!(known_subtags().any(|subtag| subtag == "zh-hans"));
        assert_eq!(lookup("English").expect("english"), &SOURCE_LANGUAGE);
    }
}
