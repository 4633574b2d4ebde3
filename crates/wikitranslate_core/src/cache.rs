use std::fmt;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::debug;

use crate::error::TranslatorError;
use crate::store::{KeyValueStore, namespaced_key};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum LinkStatus {
    Unknown,
    Exists,
    NotExists,
    Redirects,
}

impl LinkStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::Exists => "Exists",
            Self::NotExists => "NotExists",
            Self::Redirects => "Redirects",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Unknown" => Some(Self::Unknown),
            "Exists" => Some(Self::Exists),
            "NotExists" => Some(Self::NotExists),
            "Redirects" => Some(Self::Redirects),
            _ => None,
        }
    }

    /// Display rank: lower sorts first.
    pub fn priority(self) -> u8 {
        match self {
            Self::Exists => 0,
            Self::Redirects => 1,
            Self::NotExists => 2,
            Self::Unknown => 3,
        }
    }
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}

/// Time-boxed per-link status cache over a [`KeyValueStore`].
///
/// Each link occupies up to three slots: status, expiry (epoch seconds) and
/// redirect target. Expired entries are evicted when read.
pub struct LinkStatusCache<S, C = SystemClock> {
    store: S,
    clock: C,
    horizon: Duration,
}

impl<S: KeyValueStore> LinkStatusCache<S, SystemClock> {
    pub fn new(store: S) -> Self {
        Self::with_clock(store, SystemClock)
    }
}

impl<S: KeyValueStore, C: Clock> LinkStatusCache<S, C> {
    pub fn with_clock(store: S, clock: C) -> Self {
        Self {
            store,
            clock,
            horizon: Duration::hours(6),
        }
    }

    pub fn with_horizon_hours(mut self, hours: u32) -> Self {
        self.horizon = Duration::hours(i64::from(hours));
        self
    }

    pub fn get(&self, link: &str) -> Result<LinkStatus> {
        let Some(raw_status) = self.store.get_item(&status_key(link))? else {
            return Ok(LinkStatus::Unknown);
        };
        let status = LinkStatus::parse(&raw_status).ok_or_else(|| TranslatorError::CacheIntegrity {
            link: link.to_string(),
            value: raw_status.clone(),
        })?;

        let expiry = self
            .store
            .get_item(&expiry_key(link))?
            .and_then(|value| value.parse::<i64>().ok());
        let expired = match expiry {
            Some(expiry) => self.clock.now().timestamp() >= expiry,
            None => true,
        };
        if expired {
            debug!(link, "cached link status expired");
            self.invalidate(link)?;
            return Ok(LinkStatus::Unknown);
        }
        Ok(status)
    }

    pub fn set(&self, link: &str, status: LinkStatus) -> Result<()> {
        let expiry = self.clock.now() + self.horizon;
        self.store.set_item(&status_key(link), status.as_str())?;
        self.store
            .set_item(&expiry_key(link), &expiry.timestamp().to_string())
    }

    pub fn set_redirect_target(&self, link: &str, target: &str) -> Result<()> {
        self.store.set_item(&redirect_key(link), target)
    }

    pub fn get_redirect_target(&self, link: &str) -> Result<Option<String>> {
        self.store.get_item(&redirect_key(link))
    }

    pub fn expires_at(&self, link: &str) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .store
            .get_item(&expiry_key(link))?
            .and_then(|value| value.parse::<i64>().ok())
            .and_then(|seconds| DateTime::from_timestamp(seconds, 0)))
    }

    pub fn invalidate(&self, link: &str) -> Result<()> {
        self.store.remove_item(&status_key(link))?;
        self.store.remove_item(&expiry_key(link))?;
        self.store.remove_item(&redirect_key(link))
    }
}

fn status_key(link: &str) -> String {
    namespaced_key(&["link", link, "status"])
}

fn expiry_key(link: &str) -> String {
    namespaced_key(&["link", link, "expiry"])
}

fn redirect_key(link: &str) -> String {
    namespaced_key(&["link", link, "redirect"])
}
