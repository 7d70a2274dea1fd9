mod airtable;
mod models;

pub use airtable::AirtableStore;
pub use models::*;

use async_trait::async_trait;

use crate::error::StoreError;

/// The hosted table holding participants and their certificate status.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// All rows matching `filter`, in store order.
    async fn query(&self, filter: &Filter) -> Result<Vec<StoreRecord>, StoreError>;

    /// Number of rows matching `filter`.
    async fn count(&self, filter: &Filter) -> Result<usize, StoreError>;

    /// Flip a processed row out of the eligible set, attaching the uploaded
    /// PDF when there is one.
    async fn mark_generated(
        &self,
        store_id: &str,
        attachment_url: Option<&str>,
    ) -> Result<(), StoreError>;
}
