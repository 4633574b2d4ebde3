use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

static BRACKETED_LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\[([^\[\]]*)\]\]").expect("valid link pattern"));

const REDIRECT_MARKER: &str = "#REDIRECT";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WikiLinkKind {
    /// `[[:Category:Foo]]`, a link to a category page rather than a membership.
    Category,
    /// `[[#Section]]`, a link inside the current page.
    Header,
    Article,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WikiLink {
    target: String,
    anchor: Option<String>,
    alias: Option<String>,
    kind: WikiLinkKind,
}

impl WikiLink {
    /// Parses the inner text of a link; surrounding brackets are tolerated.
    pub fn parse(raw: &str) -> Self {
        let inner = raw.strip_prefix("[[").unwrap_or(raw);
        let inner = inner.strip_suffix("]]").unwrap_or(inner);

        let (target_part, alias) = match inner.split_once('|') {
            Some((target, alias)) => (target, Some(alias.to_string())),
            None => (inner, None),
        };
        let (target, anchor) = match target_part.split_once('#') {
            Some((target, anchor)) => (target, Some(anchor.to_string())),
            None => (target_part, None),
        };
        let kind = if target_part.starts_with(':') {
            WikiLinkKind::Category
        } else if target_part.starts_with('#') {
            WikiLinkKind::Header
        } else {
            WikiLinkKind::Article
        };

        Self {
            target: target.to_string(),
            anchor,
            alias,
            kind,
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn anchor(&self) -> Option<&str> {
        self.anchor.as_deref()
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    pub fn kind(&self) -> WikiLinkKind {
        self.kind
    }

    pub fn target_with_anchor(&self) -> String {
        match &self.anchor {
            Some(anchor) => format!("{}#{anchor}", self.target),
            None => self.target.clone(),
        }
    }
}

pub fn bracketed_links(text: &str) -> impl Iterator<Item = &str> {
    BRACKETED_LINK_RE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1).map(|inner| inner.as_str()))
}

pub fn is_redirect_marker(text: &str) -> bool {
    text.get(..REDIRECT_MARKER.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(REDIRECT_MARKER))
}

/// Target of a redirect page, `None` when `content` is not a redirect or
/// names no link.
pub fn find_redirect(content: &str) -> Option<WikiLink> {
    if !is_redirect_marker(content.trim_start()) {
        return None;
    }
    bracketed_links(content).next().map(WikiLink::parse)
}

#[cfg(test)]
mod tests {
    use super::{WikiLink, WikiLinkKind, bracketed_links, find_redirect, is_redirect_marker};

    #[test]
    fn parse_splits_alias_and_anchor() {
        let link = WikiLink::parse("Installation guide#Partition the disks|partitioning");
        assert_eq!(link.target(), "Installation guide");
        assert_eq!(link.anchor(), Some("Partition the disks"));
        assert_eq!(link.alias(), Some("partitioning"));
        assert_eq!(link.kind(), WikiLinkKind::Article);
        assert_eq!(
            link.target_with_anchor(),
            "Installation guide#Partition the disks"
        );
    }

    #[test]
    fn parse_classifies_by_leading_character() {
        let category = WikiLink::parse("[[:Category:Boot process]]");
        assert_eq!(category.kind(), WikiLinkKind::Category);
        assert_eq!(category.target(), ":Category:Boot process");

        let header = WikiLink::parse("#Configuration");
        assert_eq!(header.kind(), WikiLinkKind::Header);
        assert_eq!(header.target(), "");
        assert_eq!(header.anchor(), Some("Configuration"));
    }

    #[test]
    fn parse_splits_only_once() {
        let link = WikiLink::parse("A#b#c|d|e");
        assert_eq!(link.target(), "A");
        assert_eq!(link.anchor(), Some("b#c"));
        assert_eq!(link.alias(), Some("d|e"));
        assert!(!link.target().contains('#'));
        assert!(!link.target().contains('|'));
    }

    #[test]
    fn bracketed_links_are_non_overlapping() {
        let found: Vec<&str> = bracketed_links("see [[Alpha]] and [[Beta|b]], not [single]").collect();
        assert_eq!(found, vec!["Alpha", "Beta|b"]);
    }

    #[test]
    fn find_redirect_takes_first_link() {
        let target = find_redirect("#REDIRECT [[New Name#Usage]]\n[[Category:Old]]").expect("redirect");
        assert_eq!(target.target(), "New Name");
        assert_eq!(target.target_with_anchor(), "New Name#Usage");

        assert!(find_redirect("#redirect [[Lower]]").is_some());
        assert!(find_redirect("#REDIRECT").is_none());
        assert!(find_redirect("Plain [[Link]]").is_none());
        assert!(is_redirect_marker("#Redirect [[X]]"));
        assert!(!is_redirect_marker("#RED"));
    }
}
