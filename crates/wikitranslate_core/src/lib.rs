pub mod article;
pub mod cache;
pub mod config;
pub mod error;
pub mod language;
pub mod ledger;
pub mod mediawiki;
pub mod page;
pub mod resolver;
pub mod runtime;
pub mod store;
pub mod template;
pub mod wikilink;
pub mod workflow;
