use anyhow::Result;
use serde::Serialize;

use crate::error::TranslatorError;
use crate::language::{english_title_for, is_localized_title};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PageMode {
    Read,
    Editor,
    CreateEditor,
    /// Source view of a protected page; the text cannot be changed.
    ViewOnlyEditor,
    Other,
}

impl PageMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Editor => "editor",
            Self::CreateEditor => "create_editor",
            Self::ViewOnlyEditor => "view_only_editor",
            Self::Other => "other",
        }
    }

    pub fn has_editable_content(self) -> bool {
        matches!(self, Self::Editor | Self::CreateEditor)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageContext {
    title: String,
    mode: PageMode,
}

impl PageContext {
    pub fn new(title: impl Into<String>, mode: PageMode) -> Self {
        Self {
            title: title.into(),
            mode,
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn mode(&self) -> PageMode {
        self.mode
    }

    pub fn is_translation(&self) -> bool {
        is_localized_title(&self.title)
    }

    pub fn english_title(&self) -> String {
        english_title_for(&self.title)
    }

    pub fn will_draft(&self) -> bool {
        self.is_translation() && self.mode == PageMode::CreateEditor
    }

    pub fn require_editable(&self) -> Result<()> {
        if self.mode.has_editable_content() {
            return Ok(());
        }
        Err(TranslatorError::UnreachableContent {
            title: self.title.clone(),
            mode: self.mode.as_str(),
        }
        .into())
    }
}
