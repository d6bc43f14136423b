//! Query keywords and the sentence match rule

use super::retry::{with_retry, RetryPolicy};
use crate::clients::{KeywordExtractor, KEYWORD_SERVICE};
use crate::errors::{AppError, Result};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// Trim, drop blanks and dedupe case-insensitively, keeping the first-seen
/// casing and order
pub fn normalize_keywords<I, S>(keywords: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    keywords
        .into_iter()
        .filter_map(|k| {
            let trimmed = k.as_ref().trim();
            if trimmed.is_empty() || !seen.insert(trimmed.to_lowercase()) {
                None
            } else {
                Some(trimmed.to_string())
            }
        })
        .collect()
}

/// Lowercased text contains any lowercased keyword as a plain substring.
///
/// Not word-boundary aware: "cat" matches "category".
pub fn matches_any(text: &str, keywords: &[String]) -> bool {
    let haystack = text.to_lowercase();
    keywords
        .iter()
        .any(|k| haystack.contains(k.to_lowercase().as_str()))
}

/// Keywords extracted once per execution from the raw query and shared by
/// every section that needs them
#[derive(Clone)]
pub struct QueryKeywords {
    query: Arc<str>,
    extractor: Arc<dyn KeywordExtractor>,
    retry: RetryPolicy,
    cell: Arc<OnceCell<Vec<String>>>,
}

impl QueryKeywords {
    pub fn new(query: &str, extractor: Arc<dyn KeywordExtractor>, retry: RetryPolicy) -> Self {
        Self {
            query: Arc::from(query),
            extractor,
            retry,
            cell: Arc::new(OnceCell::new()),
        }
    }

    /// Extract on first use; concurrent callers wait for the same call
    pub async fn get(&self) -> Result<&[String]> {
        let keywords = self
            .cell
            .get_or_try_init(|| async {
                let raw = with_retry(&self.retry, KEYWORD_SERVICE, || {
                    self.extractor.extract_keywords(&self.query)
                })
                .await?;

                let keywords = normalize_keywords(raw);
                if keywords.is_empty() {
                    warn!("Keyword extraction returned no usable keywords");
                }
                debug!(count = keywords.len(), "Query keywords extracted");
                Ok::<_, AppError>(keywords)
            })
            .await?;

        Ok(keywords.as_slice())
    }
}
