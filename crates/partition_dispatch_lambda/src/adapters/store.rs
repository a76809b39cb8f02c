use async_trait::async_trait;

use crate::runtime::contract::{PartitionQuery, Record};

/// One page of matching records. A missing cursor ends the scan.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<C> {
    pub records: Vec<Record>,
    pub cursor: Option<C>,
}

impl<C> Page<C> {
    pub fn last(records: Vec<Record>) -> Self {
        Self {
            records,
            cursor: None,
        }
    }

    pub fn with_cursor(records: Vec<Record>, cursor: C) -> Self {
        Self {
            records,
            cursor: Some(cursor),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("store query failed: {0}")]
    Query(String),
    #[error("attribute '{attribute}' cannot be forwarded: {reason}")]
    UnsupportedAttribute { attribute: String, reason: String },
}

/// Paginated read of one partition under its composite key.
///
/// `cursor` must be the token returned by the previous call for the same
/// query; the store decides whether it is valid.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    type Cursor: Send + Sync;

    async fn fetch_page(
        &self,
        query: &PartitionQuery,
        cursor: Option<Self::Cursor>,
    ) -> Result<Page<Self::Cursor>, StoreError>;
}
