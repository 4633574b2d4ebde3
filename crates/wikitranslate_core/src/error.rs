use thiserror::Error;

/// Failure classes the core reports to its callers.
///
/// Functions return `anyhow::Result`; these variants travel inside the
/// `anyhow::Error` and can be recovered with `downcast_ref`.
#[derive(Debug, Error)]
pub enum TranslatorError {
    #[error("wiki request failed: {0}")]
    Transport(String),
    #[error("stored status {value:?} for {link} is not a valid link status")]
    CacheIntegrity { link: String, value: String },
    #[error("could not get redirect target for link {0}")]
    MalformedRedirect(String),
    #[error("invalid language key: {0}")]
    UnknownLanguage(String),
    #[error("page {title} has no editable content in {mode} mode")]
    UnreachableContent { title: String, mode: &'static str },
    #[error("{title} is not a {active} translation title")]
    NotATranslation { title: String, active: &'static str },
    #[error("source page {0} does not exist")]
    MissingSource(String),
}

impl TranslatorError {
    pub fn classify(error: &anyhow::Error) -> Option<&TranslatorError> {
        error.downcast_ref::<TranslatorError>()
    }
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;

    use super::TranslatorError;

    #[test]
    fn classify_recovers_variant_through_context() {
        let error = anyhow::Error::new(TranslatorError::MalformedRedirect("Old".to_string()))
            .context("resolving Old");
        assert!(matches!(
            TranslatorError::classify(&error),
            Some(TranslatorError::MalformedRedirect(link)) if link == "Old"
        ));
    }

    #[test]
    fn classify_ignores_foreign_errors() {
        let error = anyhow!("plain failure");
        assert!(TranslatorError::classify(&error).is_none());
    }
}
