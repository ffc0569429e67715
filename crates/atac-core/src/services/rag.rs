//! Semantic search over indexed content.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ServiceResult;
use crate::event::Payload;

/// Parameters for [`RagService::search`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagOptions {
    pub top_k: usize,
    #[serde(default)]
    pub min_score: Option<f32>,
    #[serde(default)]
    pub namespace: Option<String>,
}

impl Default for RagOptions {
    fn default() -> Self {
        Self {
            top_k: 5,
            min_score: None,
            namespace: None,
        }
    }
}

/// One search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagResult {
    pub id: String,
    pub content: String,
    pub score: f32,
    #[serde(default)]
    pub metadata: Payload,
}

/// A document to index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagDocument {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub metadata: Payload,
}

/// Top-k semantic search (`"rag"`).
#[async_trait]
pub trait RagService: Send + Sync {
    /// Returns at most `options.top_k` hits ordered by descending score.
    async fn search(&self, query: &str, options: RagOptions) -> ServiceResult<Vec<RagResult>>;

    /// Adds or replaces documents in the index.
    async fn index(
        &self,
        documents: Vec<RagDocument>,
        namespace: Option<&str>,
    ) -> ServiceResult<()>;
}
