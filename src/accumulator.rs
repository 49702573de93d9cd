//! Output artifact accumulation.
//!
//! The artifact is a single text object holding `Page {N}\n{text}\n\n` for
//! every committed page, in order. The store has no append primitive, so an
//! append reads the current object, concatenates and writes it back. There is
//! exactly one producer per document at a time, which makes that safe.

use crate::error::IngestError;
use crate::storage::{ObjectLocation, ObjectStore};
use std::sync::Arc;
use tracing::debug;

/// Format one committed page. `page_num` is 1-based.
pub fn page_section(page_num: usize, text: &str) -> String {
    format!("Page {page_num}\n{text}\n\n")
}

/// Split an artifact back into page texts, in order.
///
/// Sections are recognised by their sequential headers, so a stray
/// `Page 7` inside page 2's text does not start a new section.
pub fn parse_sections(artifact: &str) -> Vec<&str> {
    let mut sections = Vec::new();
    let Some(mut rest) = artifact.strip_prefix("Page 1\n") else {
        return sections;
    };
    let mut next = 2usize;
    loop {
        let marker = format!("\n\nPage {next}\n");
        match rest.find(&marker) {
            Some(pos) => {
                sections.push(&rest[..pos]);
                rest = &rest[pos + marker.len()..];
                next += 1;
            }
            None => {
                sections.push(rest.strip_suffix("\n\n").unwrap_or(rest));
                return sections;
            }
        }
    }
}

/// What an artifact already holds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommittedPages {
    artifact: Option<String>,
}

impl CommittedPages {
    pub fn from_artifact(artifact: impl Into<String>) -> Self {
        Self {
            artifact: Some(artifact.into()),
        }
    }

    pub fn exists(&self) -> bool {
        self.artifact.is_some()
    }

    /// Page texts as parsed from the headers. Page text that itself contains
    /// the next sequential header makes this overcount.
    pub fn sections(&self) -> Vec<&str> {
        self.artifact.as_deref().map(parse_sections).unwrap_or_default()
    }

    /// Whether the artifact ends with page `page_num` (1-based) holding
    /// exactly `text`. Does not depend on header parsing.
    pub fn ends_with_page(&self, page_num: usize, text: &str) -> bool {
        let Some(artifact) = self.artifact.as_deref() else {
            return false;
        };
        let section = page_section(page_num, text);
        if page_num == 1 {
            artifact == section
        } else {
            artifact.ends_with(&format!("\n\n{section}"))
        }
    }

    /// The artifact cut back to its first `pages` parsed sections, if the
    /// last kept section holds exactly `last_text`.
    pub fn prefix_through(&self, pages: usize, last_text: &str) -> Option<String> {
        let artifact = self.artifact.as_deref()?;
        let sections = parse_sections(artifact);
        if pages == 0 || sections.get(pages - 1) != Some(&last_text) {
            return None;
        }
        let prefix: String = sections[..pages]
            .iter()
            .enumerate()
            .map(|(i, text)| page_section(i + 1, text))
            .collect();
        artifact.starts_with(&prefix).then_some(prefix)
    }
}

/// Appends page sections to an artifact in an [`ObjectStore`].
#[derive(Clone)]
pub struct OutputAccumulator {
    store: Arc<dyn ObjectStore>,
}

impl OutputAccumulator {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Append `text`, creating the artifact if absent.
    pub async fn append(&self, location: &ObjectLocation, text: &str) -> Result<(), IngestError> {
        let mut current = self.store.get(location).await?.unwrap_or_default();
        current.extend_from_slice(text.as_bytes());
        debug!("Appending {} bytes to {} ({} total)", text.len(), location, current.len());
        self.store.put(location, current).await
    }

    /// Create or overwrite the artifact with `text`.
    pub async fn replace(&self, location: &ObjectLocation, text: &str) -> Result<(), IngestError> {
        self.store.put(location, text.as_bytes().to_vec()).await
    }

    /// Pages already present in the artifact; zero if it does not exist.
    pub async fn committed(&self, location: &ObjectLocation) -> Result<CommittedPages, IngestError> {
        Ok(match self.store.get(location).await? {
            Some(bytes) => CommittedPages::from_artifact(String::from_utf8_lossy(&bytes)),
            None => CommittedPages::default(),
        })
    }
}
