//! Uniform read/write/delete capability shared by the prefix-addressed stores

use async_trait::async_trait;

use crate::error::Result;
use crate::tree::ConfigTree;

/// A remote store holding one configuration tree per namespace.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Short name used in logs.
    fn kind(&self) -> &'static str;

    /// Read the whole tree stored under `namespace`.
    async fn read(&self, namespace: &str) -> Result<ConfigTree>;

    /// Store every leaf of `tree` under `namespace`, overwriting existing
    /// values. Not atomic: on error some leaves may already be written.
    async fn write(&self, namespace: &str, tree: &ConfigTree) -> Result<()>;

    /// Remove everything under `namespace`. Not atomic either.
    async fn delete(&self, namespace: &str) -> Result<()>;
}
