//! Table-continuity classification.
//!
//! A table that runs off the bottom of one page and continues at the top of
//! the next must be transcribed as one table. Two yes/no questions detect it:
//! does page `i-1` end with a table, and does page `i` start with one.

use crate::error::IngestError;
use crate::pipeline::describe::PageDescriber;
use crate::prompts::{LEADING_TABLE_PROMPT, TRAILING_TABLE_PROMPT};
use image::DynamicImage;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

static RE_LEADING_YES: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^\W*yes\b").unwrap());
static RE_ANY_NO: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bno\b").unwrap());

/// Only an unambiguous "yes" counts: it must be the first word and no "no"
/// may appear anywhere in the answer.
pub fn is_affirmative(answer: &str) -> bool {
    RE_LEADING_YES.is_match(answer) && !RE_ANY_NO.is_match(answer)
}

/// Whether page `page_index` should be described with the previous page's text.
pub fn carries_context(page_index: usize, prev_trailing: bool, cur_leading: bool) -> bool {
    page_index > 0 && prev_trailing && cur_leading
}

#[derive(Clone)]
pub struct TableClassifier {
    describer: PageDescriber,
}

impl TableClassifier {
    pub fn new(describer: PageDescriber) -> Self {
        Self { describer }
    }

    /// Does the page end with a table, before any footer?
    pub async fn is_trailing_table(
        &self,
        page_num: usize,
        image: &DynamicImage,
    ) -> Result<bool, IngestError> {
        let answer = self
            .describer
            .ask(page_num, TRAILING_TABLE_PROMPT, image)
            .await?;
        let yes = is_affirmative(&answer);
        debug!("Page {}: trailing table = {} ({:?})", page_num, yes, answer.trim());
        Ok(yes)
    }

    /// Does the page start with a table, after any header?
    pub async fn is_leading_table(
        &self,
        page_num: usize,
        image: &DynamicImage,
    ) -> Result<bool, IngestError> {
        let answer = self
            .describer
            .ask(page_num, LEADING_TABLE_PROMPT, image)
            .await?;
        let yes = is_affirmative(&answer);
        debug!("Page {}: leading table = {} ({:?})", page_num, yes, answer.trim());
        Ok(yes)
    }

    /// Decide whether page `page_index` (0-based) continues a table from its
    /// predecessor. No calls are made for the first page, and the leading
    /// check is skipped when the predecessor does not end with a table.
    pub async fn continues_table(
        &self,
        page_index: usize,
        previous: Option<&DynamicImage>,
        current: &DynamicImage,
    ) -> Result<bool, IngestError> {
        let Some(previous) = previous.filter(|_| page_index > 0) else {
            return Ok(false);
        };
        let prev_trailing = self.is_trailing_table(page_index, previous).await?;
        if !prev_trailing {
            return Ok(false);
        }
        let cur_leading = self.is_leading_table(page_index + 1, current).await?;
        Ok(carries_context(page_index, prev_trailing, cur_leading))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn include_previous_truth_table() {
        for i in [0usize, 1, 7] {
            for prev in [false, true] {
                for cur in [false, true] {
                    assert_eq!(carries_context(i, prev, cur), i > 0 && prev && cur);
                }
            }
        }
    }

    #[test]
    fn affirmative_answers() {
        assert!(is_affirmative("Yes"));
        assert!(is_affirmative("yes."));
        assert!(is_affirmative("  'Yes', the last element is a table."));
    }

    #[test]
    fn non_affirmative_answers() {
        assert!(!is_affirmative("No"));
        assert!(!is_affirmative("No, it is a paragraph. Yes, really."));
        assert!(!is_affirmative("Yes or no, hard to say"));
        assert!(!is_affirmative("Yesterday's table"));
        assert!(!is_affirmative("The answer is yes"));
        assert!(!is_affirmative(""));
    }
}
