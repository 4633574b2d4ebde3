use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::TranslatorError;
use crate::language::{english_title_for, is_localized_title, title_to_page_name};
use crate::mediawiki::{RemotePage, WikiReadApi};
use crate::store::{KeyValueStore, namespaced_key};
use crate::wikilink::{find_redirect, is_redirect_marker};

pub struct RevisionLedger<S> {
    store: S,
}

impl<S: KeyValueStore> RevisionLedger<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn record(&self, translated_title: &str, english_revision_id: i64) -> Result<()> {
        self.store.set_item(
            &revision_key(translated_title),
            &english_revision_id.to_string(),
        )
    }

    pub fn latest(&self, translated_title: &str) -> Result<Option<i64>> {
        let Some(raw) = self.store.get_item(&revision_key(translated_title))? else {
            return Ok(None);
        };
        let revision = raw.trim().parse::<i64>().with_context(|| {
            format!("stored revision {raw:?} for {translated_title} is not a number")
        })?;
        Ok(Some(revision))
    }

    pub fn forget(&self, translated_title: &str) -> Result<()> {
        self.store.remove_item(&revision_key(translated_title))
    }
}

fn revision_key(translated_title: &str) -> String {
    namespaced_key(&["revision", &title_to_page_name(translated_title)])
}

/// What the helper last saw of a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CachedPageInfo {
    English {
        page_name: String,
        latest_revision_id: i64,
    },
    Translated {
        page_name: String,
        latest_revision_id: i64,
        english_revision_id: Option<i64>,
    },
    Redirect {
        page_name: String,
        latest_revision_id: i64,
        redirects_to: String,
    },
}

impl CachedPageInfo {
    pub fn page_name(&self) -> &str {
        match self {
            Self::English { page_name, .. }
            | Self::Translated { page_name, .. }
            | Self::Redirect { page_name, .. } => page_name,
        }
    }

    pub fn latest_revision_id(&self) -> i64 {
        match self {
            Self::English {
                latest_revision_id, ..
            }
            | Self::Translated {
                latest_revision_id, ..
            }
            | Self::Redirect {
                latest_revision_id, ..
            } => *latest_revision_id,
        }
    }

    /// Classifies a fetched page. Translations pick up the English revision
    /// recorded in `ledger`.
    pub fn from_remote<S: KeyValueStore>(
        page: &RemotePage,
        ledger: &RevisionLedger<S>,
    ) -> Result<Self> {
        let page_name = title_to_page_name(&page.title);
        let latest_revision_id = page.revision_id;

        if is_redirect_marker(page.content.trim_start()) {
            let target = find_redirect(&page.content)
                .filter(|link| !link.target().is_empty())
                .ok_or_else(|| TranslatorError::MalformedRedirect(page.title.clone()))?;
            return Ok(Self::Redirect {
                page_name,
                latest_revision_id,
                redirects_to: target.target_with_anchor(),
            });
        }

        if is_localized_title(&page.title) {
            return Ok(Self::Translated {
                page_name,
                latest_revision_id,
                english_revision_id: ledger.latest(&page.title)?,
            });
        }

        Ok(Self::English {
            page_name,
            latest_revision_id,
        })
    }
}

pub struct PageSnapshotStore<S> {
    store: S,
}

impl<S: KeyValueStore> PageSnapshotStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn get(&self, title: &str) -> Result<Option<CachedPageInfo>> {
        let page_name = title_to_page_name(title);
        let Some(raw) = self.store.get_item(&snapshot_key(&page_name))? else {
            return Ok(None);
        };
        let info = serde_json::from_str(&raw)
            .with_context(|| format!("failed to decode page snapshot for {page_name}"))?;
        Ok(Some(info))
    }

    pub fn put(&self, info: &CachedPageInfo) -> Result<()> {
        let raw = serde_json::to_string(info).context("failed to encode page snapshot")?;
        self.store.set_item(&snapshot_key(info.page_name()), &raw)
    }

    pub fn remove(&self, title: &str) -> Result<()> {
        self.store
            .remove_item(&snapshot_key(&title_to_page_name(title)))
    }
}

fn snapshot_key(page_name: &str) -> String {
    namespaced_key(&["page", page_name])
}

pub fn snapshot_page<A, S, L>(
    api: &mut A,
    snapshots: &PageSnapshotStore<S>,
    ledger: &RevisionLedger<L>,
    title: &str,
) -> Result<CachedPageInfo>
where
    A: WikiReadApi,
    S: KeyValueStore,
    L: KeyValueStore,
{
    let page = api
        .fetch_page(title)?
        .ok_or_else(|| TranslatorError::MissingSource(title.to_string()))?;
    let info = CachedPageInfo::from_remote(&page, ledger)?;
    snapshots.put(&info)?;
    debug!(title, page_name = info.page_name(), "stored page snapshot");
    Ok(info)
}

pub fn record_english_revision<A, S>(
    api: &mut A,
    ledger: &RevisionLedger<S>,
    translated_title: &str,
) -> Result<i64>
where
    A: WikiReadApi,
    S: KeyValueStore,
{
    let english_title = english_title_for(translated_title);
    let page = api
        .fetch_page(&english_title)?
        .ok_or_else(|| TranslatorError::MissingSource(english_title.clone()))?;
    ledger.record(translated_title, page.revision_id)?;
    Ok(page.revision_id)
}
