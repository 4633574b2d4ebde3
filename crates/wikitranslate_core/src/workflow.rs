use anyhow::{Result, bail};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::info;

use crate::article::parse;
use crate::cache::{Clock, LinkStatus, LinkStatusCache, SystemClock};
use crate::config::WikiConfig;
use crate::error::TranslatorError;
use crate::language::{LanguageInfo, SOURCE_LANGUAGE, language_of_title};
use crate::ledger::{
    CachedPageInfo, PageSnapshotStore, RevisionLedger, record_english_revision, snapshot_page,
};
use crate::mediawiki::WikiReadApi;
use crate::page::PageContext;
use crate::resolver::{LocalizedArticleResolver, LocalizedLinkRecord, ResolutionFailure};
use crate::store::KeyValueStore;
use crate::template::build_translation_status_template;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranslatorSettings {
    pub localized_status_template: bool,
    pub cache_hours: u32,
    pub max_redirect_passes: usize,
}

impl Default for TranslatorSettings {
    fn default() -> Self {
        Self::from_config(&WikiConfig::default())
    }
}

impl TranslatorSettings {
    pub fn from_config(config: &WikiConfig) -> Self {
        Self {
            localized_status_template: config.localized_status_template(),
            cache_hours: config.cache_hours(),
            max_redirect_passes: config.max_redirect_passes(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LinkCheckReport {
    pub title: String,
    pub links_checked: usize,
    pub records: Vec<LocalizedLinkRecord>,
    pub failures: Vec<ResolutionFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheEntryView {
    pub link: String,
    pub status: LinkStatus,
    pub expires_at: Option<DateTime<Utc>>,
    pub redirect_target: Option<String>,
}

/// Everything a translation workflow needs, wired once by the caller.
pub struct TranslatorContext<A, S, C = SystemClock> {
    api: A,
    store: S,
    clock: C,
    language: &'static LanguageInfo,
    settings: TranslatorSettings,
}

impl<A: WikiReadApi, S: KeyValueStore> TranslatorContext<A, S, SystemClock> {
    pub fn new(
        api: A,
        store: S,
        language: &'static LanguageInfo,
        settings: TranslatorSettings,
    ) -> Self {
        Self::with_clock(api, store, SystemClock, language, settings)
    }
}

impl<A: WikiReadApi, S: KeyValueStore, C: Clock> TranslatorContext<A, S, C> {
    pub fn with_clock(
        api: A,
        store: S,
        clock: C,
        language: &'static LanguageInfo,
        settings: TranslatorSettings,
    ) -> Self {
        Self {
            api,
            store,
            clock,
            language,
            settings,
        }
    }

    pub fn language(&self) -> &'static LanguageInfo {
        self.language
    }

    pub fn settings(&self) -> &TranslatorSettings {
        &self.settings
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    fn cache(&self) -> LinkStatusCache<&S, &C> {
        LinkStatusCache::with_clock(&self.store, &self.clock)
            .with_horizon_hours(self.settings.cache_hours)
    }

    fn ledger(&self) -> RevisionLedger<&S> {
        RevisionLedger::new(&self.store)
    }

    /// Resolves every localizable link of a translation.
    ///
    /// Without `source` the current text of the page is fetched.
    pub fn check_translation(
        &mut self,
        page: &PageContext,
        source: Option<&str>,
    ) -> Result<LinkCheckReport> {
        page.require_editable()?;
        self.require_active_language(page)?;
        let fetched;
        let source = match source {
            Some(source) => source,
            None => {
                fetched = self
                    .api
                    .fetch_raw_content(page.title())?
                    .ok_or_else(|| TranslatorError::MissingSource(page.title().to_string()))?;
                fetched.as_str()
            }
        };

        let links = parse(source).localizable_links();
        let cache = LinkStatusCache::with_clock(&self.store, &self.clock)
            .with_horizon_hours(self.settings.cache_hours);
        let outcome = LocalizedArticleResolver::new(&mut self.api, &cache, self.language)
            .with_max_redirect_passes(self.settings.max_redirect_passes)
            .resolve(&links)?;
        info!(
            title = page.title(),
            links = links.len(),
            failures = outcome.failures.len(),
            "checked translation links"
        );

        Ok(LinkCheckReport {
            title: page.title().to_string(),
            links_checked: links.len(),
            records: outcome.sorted_records().into_iter().cloned().collect(),
            failures: outcome.failures,
        })
    }

    pub fn draft_translation(&mut self, page: &PageContext, date: NaiveDate) -> Result<String> {
        page.require_editable()?;
        self.require_active_language(page)?;
        if !page.will_draft() {
            bail!(
                "{} is open in {} mode; drafts are only built for pages being created",
                page.title(),
                page.mode().as_str()
            );
        }

        let english_title = page.english_title();
        let source = self
            .api
            .fetch_page(&english_title)?
            .ok_or_else(|| TranslatorError::MissingSource(english_title.clone()))?;
        let revision_id = match self.ledger().latest(page.title())? {
            Some(recorded) => recorded,
            None => source.revision_id,
        };

        let mut article = parse(&source.content);
        article.add_template(self.status_template(&english_title, date, revision_id));
        if let Some(subtag) = SOURCE_LANGUAGE.subtag {
            article.add_interlanguage_link(format!("[[{subtag}:{english_title}]]"), subtag);
        }
        info!(
            title = page.title(),
            english = english_title.as_str(),
            revision_id,
            "drafted translation"
        );
        Ok(article.page_content())
    }

    fn require_active_language(&self, page: &PageContext) -> Result<()> {
        match language_of_title(page.title()) {
            Some(found) if found.key == self.language.key => Ok(()),
            _ => Err(TranslatorError::NotATranslation {
                title: page.title().to_string(),
                active: self.language.english_name,
            }
            .into()),
        }
    }

    pub fn status_template(&self, english_title: &str, date: NaiveDate, revision_id: i64) -> String {
        let language = self
            .settings
            .localized_status_template
            .then_some(self.language);
        build_translation_status_template(english_title, date, revision_id, language)
    }

    pub fn record_revision(&mut self, translated_title: &str) -> Result<i64> {
        let ledger = RevisionLedger::new(&self.store);
        record_english_revision(&mut self.api, &ledger, translated_title)
    }

    pub fn recorded_revision(&self, translated_title: &str) -> Result<Option<i64>> {
        self.ledger().latest(translated_title)
    }

    pub fn forget_revision(&self, translated_title: &str) -> Result<()> {
        self.ledger().forget(translated_title)
    }

    pub fn snapshot(&mut self, title: &str) -> Result<CachedPageInfo> {
        let ledger = RevisionLedger::new(&self.store);
        let snapshots = PageSnapshotStore::new(&self.store);
        snapshot_page(&mut self.api, &snapshots, &ledger, title)
    }

    pub fn cache_entry(&self, link: &str) -> Result<CacheEntryView> {
        let cache = self.cache();
        let expires_at = cache.expires_at(link)?;
        let status = cache.get(link)?;
        let redirect_target = cache.get_redirect_target(link)?;
        Ok(CacheEntryView {
            link: link.to_string(),
            status,
            expires_at: if status == LinkStatus::Unknown {
                None
            } else {
                expires_at
            },
            redirect_target,
        })
    }

    pub fn invalidate_link(&self, link: &str) -> Result<()> {
        self.cache().invalidate(link)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{TranslatorContext, TranslatorSettings};
    use crate::cache::LinkStatus;
    use crate::cache::tests::ManualClock;
    use crate::error::TranslatorError;
    use crate::language::lookup;
    use crate::mediawiki::WikiReadApi;
    use crate::mediawiki::tests::MockApi;
    use crate::page::{PageContext, PageMode};
    use crate::store::MemoryStore;

    const ENGLISH_SOURCE: &str = "[[Category:Package manager]]\n[[de:Pacman]]\n{{Related articles start}}\n'''pacman''' uses [[Arch Build System]] and [[makepkg]].";

    fn new_year() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).expect("valid date")
    }

    fn context(api: MockApi, store: &MemoryStore) -> TranslatorContext<MockApi, &MemoryStore, ManualClock> {
        TranslatorContext::with_clock(
            api,
            store,
            ManualClock::new(),
            lookup("Polish").expect("polish"),
            TranslatorSettings::default(),
        )
    }

    #[test]
    fn draft_adds_status_template_and_english_link() {
        let store = MemoryStore::new();
        let api = MockApi::default().with_page("Pacman", 12345, ENGLISH_SOURCE);
        let mut translator = context(api, &store);

        let draft = translator
            .draft_translation(
                &PageContext::new("Pacman (Polski)", PageMode::CreateEditor),
                new_year(),
            )
            .expect("draft");

        assert_eq!(
            draft,
            "[[Category:Package manager]]\n[[de:Pacman]]\n[[en:Pacman]]\n{{TranslationStatus (Polski)|Pacman|2024-01-01|12345}}\n{{Related articles start}}\n'''pacman''' uses [[Arch Build System]] and [[makepkg]]."
        );
    }

    #[test]
    fn draft_prefers_recorded_revision() {
        let store = MemoryStore::new();
        let api = MockApi::default().with_page("Pacman", 12345, ENGLISH_SOURCE);
        let mut translator = context(api, &store);
        translator
            .ledger()
            .record("Pacman (Polski)", 999)
            .expect("record");

        let draft = translator
            .draft_translation(
                &PageContext::new("Pacman (Polski)", PageMode::CreateEditor),
                new_year(),
            )
            .expect("draft");
        assert!(draft.contains("{{TranslationStatus (Polski)|Pacman|2024-01-01|999}}"));
    }

    #[test]
    fn draft_requires_existing_source_and_editable_page() {
        let store = MemoryStore::new();
        let mut translator = context(MockApi::default(), &store);

        let missing = translator
            .draft_translation(
                &PageContext::new("Ghost (Polski)", PageMode::CreateEditor),
                new_year(),
            )
            .expect_err("must fail");
        assert!(matches!(
            TranslatorError::classify(&missing),
            Some(TranslatorError::MissingSource(title)) if title == "Ghost"
        ));

        let read_only = translator
            .draft_translation(
                &PageContext::new("Ghost (Polski)", PageMode::Read),
                new_year(),
            )
            .expect_err("must fail");
        assert!(matches!(
            TranslatorError::classify(&read_only),
            Some(TranslatorError::UnreachableContent { .. })
        ));
        assert_eq!(translator.api().request_count(), 1);
    }

    #[test]
    fn check_translation_sorts_records() {
        let store = MemoryStore::new();
        let api = MockApi::default()
            .with_page("makepkg (Polski)", 1, "makepkg")
            .with_page("ABS", 2, "#REDIRECT [[Arch Build System]]")
            .with_page(
                "Pacman (Polski)",
                3,
                "[[Category:Package manager (Polski)]]\nZobacz [[ABS]], [[makepkg]], [[Wine]] i [[makepkg (Polski)]].",
            );
        let mut translator = context(api, &store);

        let report = translator
            .check_translation(&PageContext::new("Pacman (Polski)", PageMode::Editor), None)
            .expect("check");

        assert_eq!(report.links_checked, 3);
        let summary = report
            .records
            .iter()
            .map(|record| (record.source_link(), record.status()))
            .collect::<Vec<_>>();
        assert_eq!(
            summary,
            vec![
                ("makepkg", LinkStatus::Exists),
                ("ABS", LinkStatus::Redirects),
                ("Arch Build System", LinkStatus::NotExists),
                ("Wine", LinkStatus::NotExists),
            ]
        );
        assert!(report.failures.is_empty());

        let cached = translator.cache_entry("ABS").expect("cache entry");
        assert_eq!(cached.status, LinkStatus::Redirects);
        assert_eq!(cached.redirect_target.as_deref(), Some("Arch Build System"));
        assert!(cached.expires_at.is_some());

        translator.invalidate_link("ABS").expect("invalidate");
        let cleared = translator.cache_entry("ABS").expect("cache entry");
        assert_eq!(cleared.status, LinkStatus::Unknown);
        assert_eq!(cleared.redirect_target, None);
    }

    #[test]
    fn workflows_reject_other_language_titles() {
        let store = MemoryStore::new();
        let api = MockApi::default().with_page("Pacman", 1, ENGLISH_SOURCE);
        let mut translator = context(api, &store);

        for title in ["Pacman (Deutsch)", "Pacman"] {
            let error = translator
                .check_translation(&PageContext::new(title, PageMode::Editor), Some("[[Wine]]"))
                .expect_err("must fail");
            assert!(matches!(
                TranslatorError::classify(&error),
                Some(TranslatorError::NotATranslation { title: reported, active: "Polish" }) if reported == title
            ));
        }
        assert_eq!(translator.api().request_count(), 0);
    }

    #[test]
    fn draft_needs_a_page_being_created() {
        let store = MemoryStore::new();
        let api = MockApi::default().with_page("Pacman", 1, ENGLISH_SOURCE);
        let mut translator = context(api, &store);

        let error = translator
            .draft_translation(
                &PageContext::new("Pacman (Polski)", PageMode::Editor),
                new_year(),
            )
            .expect_err("must fail");
        assert!(error.to_string().contains("editor mode"));
        assert_eq!(translator.api().request_count(), 0);
    }

    #[test]
    fn shared_status_template_when_configured() {
        let store = MemoryStore::new();
        let mut translator = context(MockApi::default(), &store);
        translator.settings.localized_status_template = false;
        assert_eq!(
            translator.status_template("Pacman", new_year(), 7),
            "{{TranslationStatus|Pacman|2024-01-01|7}}"
        );
    }
}
