use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::{Clock, LinkStatus, LinkStatusCache};
use crate::config::DEFAULT_MAX_REDIRECT_PASSES;
use crate::error::TranslatorError;
use crate::language::{LanguageInfo, is_localized_title, localized_title};
use crate::mediawiki::WikiReadApi;
use crate::store::KeyValueStore;
use crate::wikilink::{WikiLink, find_redirect};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RedirectTarget {
    target: String,
    anchor: Option<String>,
}

impl RedirectTarget {
    pub fn parse(raw: &str) -> Self {
        Self::from(WikiLink::parse(raw))
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn anchor(&self) -> Option<&str> {
        self.anchor.as_deref()
    }

    pub fn with_anchor(&self) -> String {
        match &self.anchor {
            Some(anchor) => format!("{}#{anchor}", self.target),
            None => self.target.clone(),
        }
    }
}

impl From<WikiLink> for RedirectTarget {
    fn from(link: WikiLink) -> Self {
        Self {
            target: link.target().to_string(),
            anchor: link.anchor().map(str::to_string),
        }
    }
}

/// Resolution result for one link. Only `Redirects` records carry a target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocalizedLinkRecord {
    source_link: String,
    status: LinkStatus,
    redirect_target: Option<RedirectTarget>,
}

impl LocalizedLinkRecord {
    pub fn exists(link: impl Into<String>) -> Self {
        Self::settled(link, LinkStatus::Exists)
    }

    pub fn not_exists(link: impl Into<String>) -> Self {
        Self::settled(link, LinkStatus::NotExists)
    }

    pub fn unknown(link: impl Into<String>) -> Self {
        Self::settled(link, LinkStatus::Unknown)
    }

    pub fn redirects(link: impl Into<String>, target: RedirectTarget) -> Self {
        Self {
            source_link: link.into(),
            status: LinkStatus::Redirects,
            redirect_target: Some(target),
        }
    }

    fn settled(link: impl Into<String>, status: LinkStatus) -> Self {
        let status = if status == LinkStatus::Redirects {
            LinkStatus::Unknown
        } else {
            status
        };
        Self {
            source_link: link.into(),
            status,
            redirect_target: None,
        }
    }

    pub fn source_link(&self) -> &str {
        &self.source_link
    }

    pub fn status(&self) -> LinkStatus {
        self.status
    }

    pub fn redirect_target(&self) -> Option<&RedirectTarget> {
        self.redirect_target.as_ref()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolutionFailure {
    pub link: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ResolutionOutcome {
    pub records: BTreeMap<String, LocalizedLinkRecord>,
    pub failures: Vec<ResolutionFailure>,
}

impl ResolutionOutcome {
    pub fn sorted_records(&self) -> Vec<&LocalizedLinkRecord> {
        sort_records(self.records.values())
    }

    fn insert(&mut self, record: LocalizedLinkRecord) {
        self.records
            .entry(record.source_link.clone())
            .or_insert(record);
    }
}

/// Exists first, then Redirects, NotExists and Unknown; ties by link name.
pub fn sort_records<'a>(
    records: impl IntoIterator<Item = &'a LocalizedLinkRecord>,
) -> Vec<&'a LocalizedLinkRecord> {
    let mut sorted = records.into_iter().collect::<Vec<_>>();
    sorted.sort_by(|left, right| {
        left.status
            .priority()
            .cmp(&right.status.priority())
            .then_with(|| left.source_link.cmp(&right.source_link))
    });
    sorted
}

/// Decides, per English link, whether a translated page exists.
///
/// Redirecting links are followed pass by pass. A link is resolved at most
/// once per run, so redirect cycles end when they revisit a link; links still
/// pending after `max_redirect_passes` passes are reported as `Unknown`.
pub struct LocalizedArticleResolver<'a, A, S, C> {
    api: &'a mut A,
    cache: &'a LinkStatusCache<S, C>,
    language: &'a LanguageInfo,
    max_redirect_passes: usize,
}

impl<'a, A, S, C> LocalizedArticleResolver<'a, A, S, C>
where
    A: WikiReadApi,
    S: KeyValueStore,
    C: Clock,
{
    pub fn new(
        api: &'a mut A,
        cache: &'a LinkStatusCache<S, C>,
        language: &'a LanguageInfo,
    ) -> Self {
        Self {
            api,
            cache,
            language,
            max_redirect_passes: DEFAULT_MAX_REDIRECT_PASSES,
        }
    }

    pub fn with_max_redirect_passes(mut self, passes: usize) -> Self {
        self.max_redirect_passes = passes.max(1);
        self
    }

    pub fn resolve(&mut self, links: &[String]) -> Result<ResolutionOutcome> {
        let mut outcome = ResolutionOutcome::default();
        let mut visited = BTreeSet::new();
        let mut pending = links
            .iter()
            .filter(|link| visited.insert(link.to_string()))
            .cloned()
            .collect::<Vec<_>>();

        let mut pass = 0;
        while !pending.is_empty() {
            if pass == self.max_redirect_passes {
                warn!(
                    remaining = pending.len(),
                    passes = pass,
                    "redirect chain too long, giving up"
                );
                for link in pending {
                    outcome.insert(LocalizedLinkRecord::unknown(link));
                }
                break;
            }
            pass += 1;
            debug!(pass, links = pending.len(), "resolution pass");

            let redirected = self.resolve_pass(&pending, &mut outcome)?;

            let mut next = Vec::new();
            for target in redirected {
                let name = target.target();
                if name.is_empty() || is_localized_title(name) {
                    continue;
                }
                if !visited.insert(name.to_string()) {
                    if outcome
                        .records
                        .get(name)
                        .is_some_and(|record| record.status == LinkStatus::Redirects)
                    {
                        warn!(link = name, "redirect cycle detected");
                    }
                    continue;
                }
                next.push(name.to_string());
            }
            pending = next;
        }

        Ok(outcome)
    }

    fn resolve_pass(
        &mut self,
        links: &[String],
        outcome: &mut ResolutionOutcome,
    ) -> Result<Vec<RedirectTarget>> {
        let mut redirected = Vec::new();
        let mut misses = Vec::new();

        for link in links {
            match self.cache.get(link)? {
                LinkStatus::Exists => outcome.insert(LocalizedLinkRecord::exists(link.as_str())),
                LinkStatus::NotExists => {
                    outcome.insert(LocalizedLinkRecord::not_exists(link.as_str()))
                }
                LinkStatus::Redirects => match self.cache.get_redirect_target(link)? {
                    Some(stored) => {
                        let target = RedirectTarget::parse(&stored);
                        debug!(link = link.as_str(), target = %stored, "cached redirect");
                        outcome.insert(LocalizedLinkRecord::redirects(link.as_str(), target.clone()));
                        redirected.push(target);
                    }
                    None => misses.push(link.clone()),
                },
                LinkStatus::Unknown => misses.push(link.clone()),
            }
        }

        if misses.is_empty() {
            return Ok(redirected);
        }

        let localized = misses
            .iter()
            .map(|link| localized_title(link, self.language))
            .collect::<Vec<_>>();
        let page_info = self.api.query_page_info(&localized)?;

        let mut untranslated = Vec::new();
        for (link, title) in misses.iter().zip(&localized) {
            if page_info.get(title).is_some_and(|info| info.exists) {
                debug!(link = link.as_str(), "translation exists");
                self.cache.set(link, LinkStatus::Exists)?;
                outcome.insert(LocalizedLinkRecord::exists(link.as_str()));
            } else {
                untranslated.push(link.clone());
            }
        }
        if untranslated.is_empty() {
            return Ok(redirected);
        }

        let english_info = self.api.query_page_info(&untranslated)?;
        let mut redirecting = Vec::new();
        for link in untranslated {
            if english_info.get(&link).is_some_and(|info| info.is_redirect) {
                redirecting.push(link);
            } else {
                self.cache.set(&link, LinkStatus::NotExists)?;
                outcome.insert(LocalizedLinkRecord::not_exists(link));
            }
        }

        for (link, target) in self.redirect_targets(&redirecting)? {
            let Some(target) = target else {
                let error = TranslatorError::MalformedRedirect(link.clone());
                warn!(link = link.as_str(), %error, "skipping malformed redirect");
                outcome.failures.push(ResolutionFailure {
                    link,
                    message: error.to_string(),
                });
                continue;
            };
            info!(link = link.as_str(), target = %target.with_anchor(), "link redirects");
            self.cache.set(&link, LinkStatus::Redirects)?;
            self.cache.set_redirect_target(&link, &target.with_anchor())?;
            outcome.insert(LocalizedLinkRecord::redirects(link, target.clone()));
            redirected.push(target);
        }

        Ok(redirected)
    }

    /// Content is read first so the anchor survives; pages whose text names
    /// no link fall back to one batched links query.
    fn redirect_targets(
        &mut self,
        links: &[String],
    ) -> Result<Vec<(String, Option<RedirectTarget>)>> {
        let mut targets = Vec::with_capacity(links.len());
        let mut unparsed = Vec::new();
        for link in links {
            let found = self
                .api
                .fetch_raw_content(link)?
                .as_deref()
                .and_then(find_redirect)
                .filter(|found| !found.target().is_empty());
            match found {
                Some(found) => targets.push((link.clone(), Some(RedirectTarget::from(found)))),
                None => unparsed.push(link.clone()),
            }
        }
        if unparsed.is_empty() {
            return Ok(targets);
        }

        let first_links = self.api.query_outgoing_links(&unparsed)?;
        for link in unparsed {
            let target = first_links.get(&link).map(|first| RedirectTarget::parse(first));
            targets.push((link, target));
        }
        Ok(targets)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::{LocalizedArticleResolver, LocalizedLinkRecord, RedirectTarget, sort_records};
    use crate::cache::tests::ManualClock;
    use crate::cache::{LinkStatus, LinkStatusCache};
    use crate::error::TranslatorError;
    use crate::language::lookup;
    use crate::ledger::{CachedPageInfo, PageSnapshotStore, RevisionLedger};
    use crate::mediawiki::WikiReadApi;
    use crate::mediawiki::tests::MockApi;
    use crate::store::MemoryStore;

    fn links(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn redirect_is_followed_and_merged() {
        let polish = lookup("Polish").expect("polish");
        let mut api = MockApi::default()
            .with_page("Old Name", 1, "#REDIRECT [[New Name]]")
            .with_page("New Name (Polski)", 2, "Treść");
        let store = MemoryStore::new();
        let cache = LinkStatusCache::with_clock(&store, ManualClock::new());

        let outcome = LocalizedArticleResolver::new(&mut api, &cache, polish)
            .resolve(&links(&["Old Name"]))
            .expect("resolve");

        let old = &outcome.records["Old Name"];
        assert_eq!(old.status(), LinkStatus::Redirects);
        assert_eq!(
            old.redirect_target().map(RedirectTarget::target),
            Some("New Name")
        );
        assert_eq!(outcome.records["New Name"].status(), LinkStatus::Exists);
        assert!(outcome.failures.is_empty());
        assert_eq!(
            api.page_info_batches,
            vec![
                links(&["Old Name (Polski)"]),
                links(&["Old Name"]),
                links(&["New Name (Polski)"])
            ]
        );
        assert_eq!(api.content_fetches, links(&["Old Name"]));
    }

    #[test]
    fn plain_missing_links_need_no_content_fetch() {
        let polish = lookup("Polish").expect("polish");
        let mut api = MockApi::default()
            .with_page("L1", 1, "Plain article")
            .with_page("L3", 3, "#REDIRECT [[L1#Intro]]");
        let store = MemoryStore::new();
        let cache = LinkStatusCache::with_clock(&store, ManualClock::new());
        let requested = links(&["L0", "L1", "L2", "L3", "L4"]);

        let outcome = LocalizedArticleResolver::new(&mut api, &cache, polish)
            .resolve(&requested)
            .expect("resolve");

        assert_eq!(api.content_fetches, links(&["L3"]));
        assert_eq!(
            api.page_info_batches,
            vec![
                links(&["L0 (Polski)", "L1 (Polski)", "L2 (Polski)", "L3 (Polski)", "L4 (Polski)"]),
                requested.clone()
            ]
        );
        for link in ["L0", "L1", "L2", "L4"] {
            assert_eq!(outcome.records[link].status(), LinkStatus::NotExists);
        }
        assert_eq!(
            outcome.records["L3"]
                .redirect_target()
                .map(RedirectTarget::with_anchor),
            Some("L1#Intro".to_string())
        );
    }

    #[test]
    fn stored_snapshots_do_not_leak_into_link_statuses() {
        let polish = lookup("Polish").expect("polish");
        let store = MemoryStore::new();
        PageSnapshotStore::new(&store)
            .put(&CachedPageInfo::English {
                page_name: "Foo_status".to_string(),
                latest_revision_id: 1,
            })
            .expect("store snapshot");
        RevisionLedger::new(&store)
            .record("Foo_status", 2)
            .expect("record revision");
        let mut api = MockApi::default().with_page("page_Foo (Polski)", 3, "Treść");
        let cache = LinkStatusCache::with_clock(&store, ManualClock::new());

        let outcome = LocalizedArticleResolver::new(&mut api, &cache, polish)
            .resolve(&links(&["page_Foo", "revision_Foo"]))
            .expect("resolve");

        assert_eq!(outcome.records["page_Foo"].status(), LinkStatus::Exists);
        assert_eq!(outcome.records["revision_Foo"].status(), LinkStatus::NotExists);
        assert_eq!(
            PageSnapshotStore::new(&store)
                .get("Foo_status")
                .expect("snapshot")
                .map(|info| info.latest_revision_id()),
            Some(1)
        );
    }

    #[test]
    fn cached_results_skip_the_network() {
        let polish = lookup("Polish").expect("polish");
        let mut api = MockApi::default()
            .with_page("Old Name", 1, "#REDIRECT [[New Name#Usage]]")
            .with_page("Pacman (Polski)", 2, "Pacman");
        let store = MemoryStore::new();
        let clock = ManualClock::new();
        let cache = LinkStatusCache::with_clock(&store, &clock);
        let requested = links(&["Old Name", "Pacman", "Wine"]);

        let first = LocalizedArticleResolver::new(&mut api, &cache, polish)
            .resolve(&requested)
            .expect("first run");
        let requests_after_first = api.request_count();

        let second = LocalizedArticleResolver::new(&mut api, &cache, polish)
            .resolve(&requested)
            .expect("second run");
        assert_eq!(api.request_count(), requests_after_first);
        assert_eq!(first.records, second.records);
        assert_eq!(
            second.records["Old Name"]
                .redirect_target()
                .map(RedirectTarget::with_anchor),
            Some("New Name#Usage".to_string())
        );

        clock.advance(Duration::hours(7));
        LocalizedArticleResolver::new(&mut api, &cache, polish)
            .resolve(&requested)
            .expect("after expiry");
        assert!(api.request_count() > requests_after_first);
    }

    #[test]
    fn redirect_cycle_terminates() {
        let polish = lookup("Polish").expect("polish");
        let mut api = MockApi::default()
            .with_page("Alpha", 1, "#REDIRECT [[Beta]]")
            .with_page("Beta", 2, "#REDIRECT [[Alpha]]")
            .with_page("Self", 3, "#REDIRECT [[Self]]");
        let store = MemoryStore::new();
        let cache = LinkStatusCache::with_clock(&store, ManualClock::new());

        let outcome = LocalizedArticleResolver::new(&mut api, &cache, polish)
            .resolve(&links(&["Alpha", "Self"]))
            .expect("resolve");

        assert_eq!(outcome.records.len(), 3);
        assert_eq!(outcome.records["Beta"].status(), LinkStatus::Redirects);
        assert_eq!(outcome.records["Self"].status(), LinkStatus::Redirects);
    }

    #[test]
    fn long_chains_stop_at_the_pass_bound() {
        let polish = lookup("Polish").expect("polish");
        let mut api = MockApi::default()
            .with_page("A", 1, "#REDIRECT [[B]]")
            .with_page("B", 2, "#REDIRECT [[C]]")
            .with_page("C", 3, "#REDIRECT [[D]]");
        let store = MemoryStore::new();
        let cache = LinkStatusCache::with_clock(&store, ManualClock::new());

        let outcome = LocalizedArticleResolver::new(&mut api, &cache, polish)
            .with_max_redirect_passes(2)
            .resolve(&links(&["A"]))
            .expect("resolve");

        assert_eq!(outcome.records["A"].status(), LinkStatus::Redirects);
        assert_eq!(outcome.records["B"].status(), LinkStatus::Redirects);
        assert_eq!(outcome.records["C"].status(), LinkStatus::Unknown);
        assert!(!outcome.records.contains_key("D"));
    }

    #[test]
    fn malformed_redirect_does_not_abort_siblings() {
        let polish = lookup("Polish").expect("polish");
        let mut api = MockApi::default()
            .with_page("Broken", 1, "#REDIRECT nowhere")
            .with_page("Via Links", 2, "#REDIRECT")
            .with_page("Plain", 3, "Plain article");
        api.outgoing_links
            .insert("Via Links".to_string(), "Target#Part".to_string());
        let store = MemoryStore::new();
        let cache = LinkStatusCache::with_clock(&store, ManualClock::new());

        let outcome = LocalizedArticleResolver::new(&mut api, &cache, polish)
            .resolve(&links(&["Broken", "Via Links", "Plain"]))
            .expect("resolve");

        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].link, "Broken");
        assert!(!outcome.records.contains_key("Broken"));
        assert_eq!(
            outcome.records["Via Links"]
                .redirect_target()
                .map(RedirectTarget::with_anchor),
            Some("Target#Part".to_string())
        );
        assert_eq!(outcome.records["Plain"].status(), LinkStatus::NotExists);
        assert_eq!(outcome.records["Target"].status(), LinkStatus::NotExists);
    }

    #[test]
    fn localized_redirect_targets_are_not_chased() {
        let polish = lookup("Polish").expect("polish");
        let mut api =
            MockApi::default().with_page("Moved", 1, "#REDIRECT [[Moved (Polski)]]");
        let store = MemoryStore::new();
        let cache = LinkStatusCache::with_clock(&store, ManualClock::new());

        let outcome = LocalizedArticleResolver::new(&mut api, &cache, polish)
            .resolve(&links(&["Moved"]))
            .expect("resolve");

        assert_eq!(outcome.records.len(), 1);
        assert_eq!(
            api.page_info_batches,
            vec![links(&["Moved (Polski)"]), links(&["Moved"])]
        );
    }

    #[test]
    fn transport_error_aborts_the_run() {
        let polish = lookup("Polish").expect("polish");
        let mut api = MockApi::default();
        api.failing_titles.insert("Down".to_string());
        let store = MemoryStore::new();
        let cache = LinkStatusCache::with_clock(&store, ManualClock::new());

        let error = LocalizedArticleResolver::new(&mut api, &cache, polish)
            .resolve(&links(&["Fine", "Down"]))
            .expect_err("must fail");
        assert!(matches!(
            TranslatorError::classify(&error),
            Some(TranslatorError::Transport(_))
        ));
    }

    #[test]
    fn records_sort_by_priority_then_name() {
        let records = [
            LocalizedLinkRecord::unknown("Zeta"),
            LocalizedLinkRecord::not_exists("Beta"),
            LocalizedLinkRecord::redirects("Gamma", RedirectTarget::parse("Delta")),
            LocalizedLinkRecord::exists("Omega"),
            LocalizedLinkRecord::exists("Alpha"),
        ];
        let names = sort_records(&records)
            .into_iter()
            .map(LocalizedLinkRecord::source_link)
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["Alpha", "Omega", "Gamma", "Beta", "Zeta"]);
        assert!(records[0].redirect_target().is_none());
    }
}
