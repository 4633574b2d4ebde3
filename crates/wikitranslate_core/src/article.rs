use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::language::{is_localized_title, known_subtags};
use crate::wikilink::{WikiLink, WikiLinkKind, bracketed_links, is_redirect_marker};

/// Inter-wiki prefixes whose links never get a localized counterpart.
static INTERWIKI_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(wikipedia|w|mw):").expect("valid interwiki pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LineKind {
    EmptyLine,
    Redirect,
    InterlanguageLink,
    Category,
    RelatedArticle,
    MagicWord,
    Template,
    EndOfHeader,
    ContentLine,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParsedArticle {
    redirects: Vec<String>,
    magic_words: Vec<String>,
    categories: Vec<String>,
    interlanguage_links: BTreeMap<String, String>,
    templates: Vec<String>,
    related_articles: Vec<String>,
    body: Vec<String>,
    links: Vec<WikiLink>,
}

impl ParsedArticle {
    pub fn redirects(&self) -> &[String] {
        &self.redirects
    }

    pub fn magic_words(&self) -> &[String] {
        &self.magic_words
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    pub fn interlanguage_links(&self) -> &BTreeMap<String, String> {
        &self.interlanguage_links
    }

    pub fn templates(&self) -> &[String] {
        &self.templates
    }

    pub fn related_articles(&self) -> &[String] {
        &self.related_articles
    }

    pub fn body(&self) -> &[String] {
        &self.body
    }

    pub fn links(&self) -> &[WikiLink] {
        &self.links
    }

    pub fn is_redirect(&self) -> bool {
        !self.redirects.is_empty()
    }

    pub fn add_interlanguage_link(&mut self, line: impl Into<String>, subtag: impl Into<String>) {
        self.interlanguage_links.insert(subtag.into(), line.into());
    }

    pub fn add_template(&mut self, line: impl Into<String>) {
        self.templates.push(line.into());
    }

    /// Header lines in the wiki's mandated order, each ending in a newline.
    pub fn header_text(&self) -> String {
        let lines = self
            .redirects
            .iter()
            .chain(&self.magic_words)
            .chain(&self.categories)
            .chain(self.interlanguage_links.values())
            .chain(&self.templates)
            .chain(&self.related_articles);

        let mut output = String::new();
        for line in lines {
            output.push_str(line);
            output.push('\n');
        }
        output
    }

    pub fn page_content(&self) -> String {
        let mut output = self.header_text();
        output.push_str(&self.body.join("\n"));
        output
    }

    /// Distinct article and category targets that still need a translation.
    pub fn localizable_links(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        let mut output = Vec::new();
        for link in &self.links {
            if !matches!(link.kind(), WikiLinkKind::Article | WikiLinkKind::Category) {
                continue;
            }
            let target = link.target();
            if target.is_empty() || is_localized_title(target) {
                continue;
            }
            if seen.insert(target.to_string()) {
                output.push(target.to_string());
            }
        }
        output
    }
}

#[derive(Debug, Clone)]
pub struct ArticleParser {
    subtags: Vec<&'static str>,
    in_header: bool,
    categorized: bool,
    article: ParsedArticle,
}

impl Default for ArticleParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ArticleParser {
    pub fn new() -> Self {
        Self {
            subtags: known_subtags().collect(),
            in_header: true,
            categorized: false,
            article: ParsedArticle::default(),
        }
    }

    pub fn parse_line(&mut self, line: &str) -> LineKind {
        if !self.in_header {
            self.push_body_line(line);
            return LineKind::ContentLine;
        }

        let kind = self.classify_header_line(line);
        match kind {
            LineKind::EmptyLine => {}
            LineKind::Redirect => {
                self.article.redirects.push(line.to_string());
                self.in_header = false;
            }
            LineKind::InterlanguageLink => {
                if let Some(subtag) = self.interlanguage_subtag(line.trim_end_matches('\r')) {
                    self.article
                        .interlanguage_links
                        .insert(subtag.to_string(), line.to_string());
                }
                self.categorized = true;
            }
            LineKind::Category => {
                self.article.categories.push(line.to_string());
                self.categorized = true;
            }
            LineKind::RelatedArticle => self.article.related_articles.push(line.to_string()),
            LineKind::MagicWord => self.article.magic_words.push(line.to_string()),
            LineKind::Template => self.article.templates.push(line.to_string()),
            LineKind::EndOfHeader => {
                self.in_header = false;
                self.push_body_line(line);
            }
            LineKind::ContentLine => self.push_body_line(line),
        }
        kind
    }

    pub fn finish(self) -> ParsedArticle {
        self.article
    }

    fn classify_header_line(&self, line: &str) -> LineKind {
        let trimmed = line.trim_end_matches('\r');
        if trimmed.trim().is_empty() {
            return LineKind::EmptyLine;
        }
        if is_redirect_marker(trimmed) {
            return LineKind::Redirect;
        }
        if self.interlanguage_subtag(trimmed).is_some() {
            return LineKind::InterlanguageLink;
        }
        if trimmed.starts_with("[[Category") {
            return LineKind::Category;
        }
        if trimmed.starts_with("{{Related") {
            return LineKind::RelatedArticle;
        }
        if trimmed.starts_with("{{") || trimmed.starts_with("__") {
            return if self.categorized {
                LineKind::Template
            } else {
                LineKind::MagicWord
            };
        }
        LineKind::EndOfHeader
    }

    fn interlanguage_subtag(&self, line: &str) -> Option<&'static str> {
        let rest = line.strip_prefix("[[")?;
        self.subtags.iter().copied().find(|subtag| {
            rest.strip_prefix(*subtag)
                .is_some_and(|after| after.starts_with(':'))
        })
    }

    fn push_body_line(&mut self, line: &str) {
        for inner in bracketed_links(line) {
            if INTERWIKI_PREFIX_RE.is_match(inner) {
                continue;
            }
            self.article.links.push(WikiLink::parse(inner));
        }
        self.article.body.push(line.to_string());
    }
}

pub fn parse(source: &str) -> ParsedArticle {
    let mut parser = ArticleParser::new();
    for line in source.split('\n') {
        parser.parse_line(line);
    }
    parser.finish()
}
