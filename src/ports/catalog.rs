use crate::domain::asset::{Asset, AssetId};
use crate::error::StreamError;
use async_trait::async_trait;

/// Read-only view of the asset catalog.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AssetCatalog: Send + Sync {
    /// `Ok(None)` when the id is unknown.
    async fn find(&self, id: AssetId) -> Result<Option<Asset>, StreamError>;

    async fn list(&self) -> Result<Vec<Asset>, StreamError>;
}
