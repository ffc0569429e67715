//! Document store keyed by collection and id.

use std::cmp::Ordering;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ServiceResult;
use crate::event::Payload;

/// Comparison operator of a [`QueryFilter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOp {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "in")]
    In,
    #[serde(rename = "not-in")]
    NotIn,
    #[serde(rename = "array-contains")]
    ArrayContains,
}

impl FilterOp {
    /// Evaluates `field <op> operand`.
    ///
    /// A missing field never matches. Ordering operators compare numbers with
    /// numbers and strings with strings; any other pairing does not match.
    pub fn matches(&self, field: Option<&Value>, operand: &Value) -> bool {
        let Some(field) = field else {
            return false;
        };
        match self {
            Self::Eq => field == operand,
            Self::Ne => field != operand,
            Self::Gt => compare(field, operand) == Some(Ordering::Greater),
            Self::Lt => compare(field, operand) == Some(Ordering::Less),
            Self::Ge => matches!(
                compare(field, operand),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Self::Le => matches!(
                compare(field, operand),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Self::In => operand
                .as_array()
                .is_some_and(|candidates| candidates.contains(field)),
            Self::NotIn => operand
                .as_array()
                .is_some_and(|candidates| !candidates.contains(field)),
            Self::ArrayContains => field
                .as_array()
                .is_some_and(|items| items.contains(operand)),
        }
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// One predicate of a [`DataService::query`].
///
/// `field` may be a dotted path (`"profile.age"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryFilter {
    pub field: String,
    #[serde(rename = "operator")]
    pub op: FilterOp,
    pub value: Value,
}

impl QueryFilter {
    pub fn new(field: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    /// Evaluates the filter against a document.
    pub fn matches(&self, document: &Value) -> bool {
        let field = self
            .field
            .split('.')
            .try_fold(document, |value, key| value.get(key));
        self.op.matches(field, &self.value)
    }
}

/// A stored document and its id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub data: Value,
}

/// Document store (`"data"`).
#[async_trait]
pub trait DataService: Send + Sync {
    async fn get(&self, collection: &str, id: &str) -> ServiceResult<Option<Value>>;

    /// Creates or replaces the document.
    async fn set(&self, collection: &str, id: &str, data: Value) -> ServiceResult<()>;

    /// Merges top-level fields into an existing document.
    async fn update(&self, collection: &str, id: &str, patch: Payload) -> ServiceResult<()>;

    async fn delete(&self, collection: &str, id: &str) -> ServiceResult<()>;

    /// Returns documents matching every filter (logical AND).
    async fn query(
        &self,
        collection: &str,
        filters: &[QueryFilter],
    ) -> ServiceResult<Vec<Document>>;

    /// Stores a document under a generated id and returns the id.
    async fn add(&self, collection: &str, data: Value) -> ServiceResult<String>;
}
