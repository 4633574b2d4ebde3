use chrono::NaiveDate;

use crate::language::LanguageInfo;

const TRANSLATION_STATUS_TEMPLATE: &str = "TranslationStatus";

fn template_name(language: Option<&LanguageInfo>) -> String {
    match language {
        Some(language) => format!(
            "{TRANSLATION_STATUS_TEMPLATE} ({})",
            language.localized_name
        ),
        None => TRANSLATION_STATUS_TEMPLATE.to_string(),
    }
}

/// With `language` set the per-language template variant is used, otherwise
/// the shared one.
pub fn build_translation_status_template(
    english_name: &str,
    date: NaiveDate,
    english_revision_id: i64,
    language: Option<&LanguageInfo>,
) -> String {
    format!(
        "{{{{{}|{english_name}|{}|{english_revision_id}}}}}",
        template_name(language),
        date.format("%Y-%m-%d")
    )
}
