use crate::models::{Label, NativeFilter};
use anyhow::Result;
use async_trait::async_trait;

/// The remote side of the sync: Gmail's filter and label directories.
///
/// Each call is one blocking round trip; callers await them one at a time.
#[async_trait]
pub trait GmailService: Send + Sync {
    async fn list_filters(&self) -> Result<Vec<NativeFilter>>;

    /// Creates the filter and returns it with its server-assigned id.
    async fn create_filter(&self, filter: &NativeFilter) -> Result<NativeFilter>;

    async fn delete_filter(&self, id: &str) -> Result<()>;

    async fn list_labels(&self) -> Result<Vec<Label>>;

    async fn create_label(&self, name: &str) -> Result<Label>;
}
