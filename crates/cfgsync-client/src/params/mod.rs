//! Hierarchical parameter store adapter
//!
//! Moves configuration trees to and from a flat, rate-limited, paginated
//! parameter backend: trees are flattened into one parameter per leaf,
//! read back page by page, and deleted in small batches.

pub mod backend;
pub mod delete;
pub mod fetch;
pub mod local;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use self::backend::{Parameter, ParameterBackend, ParameterType, PutParameter};
use self::fetch::FetchOptions;
use crate::codec::{self, ArrayEncoding, EncodedValue, FlatPath};
use crate::error::{Result, SyncError};
use crate::limiter::CallGate;
use crate::store::ConfigStore;
use crate::tree::{ConfigTree, ConfigValue};

/// Calls per second that stay clear of the hosted store's burst limit
/// when writing a whole configuration.
pub const DEFAULT_REQUESTS_PER_SECOND: f64 = 2.0;

/// Shape of the tree returned by a read.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadRoot {
    /// The tree below the prefix.
    #[default]
    Stripped,
    /// The prefix segments stay as the outer keys.
    Prefixed,
}

/// Configuration for [`ParameterStore`]
#[derive(Clone, Debug)]
pub struct ParameterStoreConfig {
    pub requests_per_second: f64,
    pub array_encoding: ArrayEncoding,
    pub read_root: ReadRoot,
    /// Write scalars as `SecureString` rather than `String`.
    pub secure: bool,
    /// Upper bound on pages per listing; `None` follows tokens until the
    /// backend stops returning them.
    pub max_pages: Option<u32>,
}

impl Default for ParameterStoreConfig {
    fn default() -> Self {
        Self {
            requests_per_second: DEFAULT_REQUESTS_PER_SECOND,
            array_encoding: ArrayEncoding::Json,
            read_root: ReadRoot::Stripped,
            secure: true,
            max_pages: None,
        }
    }
}

impl ParameterStoreConfig {
    pub fn with_rate(mut self, requests_per_second: f64) -> Self {
        self.requests_per_second = requests_per_second;
        self
    }

    pub fn with_array_encoding(mut self, encoding: ArrayEncoding) -> Self {
        self.array_encoding = encoding;
        self
    }

    pub fn with_read_root(mut self, read_root: ReadRoot) -> Self {
        self.read_root = read_root;
        self
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn with_max_pages(mut self, max_pages: Option<u32>) -> Self {
        self.max_pages = max_pages;
        self
    }
}

/// Config store adapter over a [`ParameterBackend`].
pub struct ParameterStore {
    backend: Arc<dyn ParameterBackend>,
    gate: CallGate,
    config: ParameterStoreConfig,
}

impl ParameterStore {
    /// Create the adapter and its call gate. Must run inside a Tokio runtime.
    pub fn new(backend: Arc<dyn ParameterBackend>, config: ParameterStoreConfig) -> Result<Self> {
        let gate = CallGate::new(config.requests_per_second)?;
        Ok(Self {
            backend,
            gate,
            config,
        })
    }

    pub fn config(&self) -> &ParameterStoreConfig {
        &self.config
    }

    /// Lists every raw parameter below `prefix`.
    pub async fn fetch_all(
        &self,
        prefix: &str,
        recursive: bool,
        with_decryption: bool,
    ) -> Result<Vec<Parameter>> {
        let root = FlatPath::parse_prefix(prefix)?;
        let options = FetchOptions {
            recursive,
            with_decryption,
            max_pages: self.config.max_pages,
        };
        fetch::fetch_all(&self.backend, &self.gate, &root.to_string(), options).await
    }

    /// Deletes every parameter below `prefix`, returning how many were
    /// removed. Only recursive deletes are supported.
    pub async fn delete_path(&self, prefix: &str, recursive: bool) -> Result<usize> {
        if !recursive {
            return Err(SyncError::unsupported("non-recursive delete"));
        }
        let root = FlatPath::parse_prefix(prefix)?;
        let params = self.fetch_all(prefix, true, false).await?;
        let names: Vec<String> = params.into_iter().map(|p| p.name).collect();
        debug!(prefix = %root, count = names.len(), "Deleting parameters");

        let deleted = delete::delete_all(&self.backend, &self.gate, names).await?;
        info!(prefix = %root, deleted, "Deleted parameters");
        Ok(deleted)
    }

    fn encode_leaves(&self, root: &FlatPath, tree: &ConfigTree) -> Result<Vec<PutParameter>> {
        let leaves = codec::flatten(root, tree)?;
        let mut requests = Vec::with_capacity(leaves.len());
        for (path, value) in leaves {
            let (value, param_type) = match codec::encode(&value, self.config.array_encoding)? {
                EncodedValue::List(v) => (v, ParameterType::StringList),
                EncodedValue::Json(v) if self.config.secure => (v, ParameterType::SecureString),
                EncodedValue::Json(v) => (v, ParameterType::String),
            };
            requests.push(PutParameter {
                name: path.to_string(),
                value,
                overwrite: true,
                param_type,
            });
        }
        Ok(requests)
    }

    fn decode_parameter(
        &self,
        root: &FlatPath,
        param: Parameter,
    ) -> Option<(Vec<String>, ConfigValue)> {
        let path = match FlatPath::parse(&param.name) {
            Ok(path) => path,
            Err(e) => {
                warn!(parameter = %param.name, error = %e, "Skipping parameter with invalid name");
                return None;
            }
        };
        let value = match param.param_type {
            ParameterType::StringList => codec::decode_list(&param.value),
            _ => codec::decode(&param.name, &param.value)?,
        };
        let segments = match self.config.read_root {
            ReadRoot::Prefixed => path.into_segments(),
            ReadRoot::Stripped => match path.strip_prefix(root) {
                Some(rest) if !rest.is_empty() => rest.to_vec(),
                _ => {
                    warn!(parameter = %param.name, prefix = %root, "Skipping parameter outside prefix");
                    return None;
                }
            },
        };
        Some((segments, value))
    }
}

#[async_trait]
impl ConfigStore for ParameterStore {
    fn kind(&self) -> &'static str {
        "parameter-store"
    }

    async fn read(&self, namespace: &str) -> Result<ConfigTree> {
        let root = FlatPath::parse_prefix(namespace)?;
        let params = self.fetch_all(namespace, true, true).await?;
        let total = params.len();

        let pairs: Vec<_> = params
            .into_iter()
            .filter_map(|param| self.decode_parameter(&root, param))
            .collect();
        let skipped = total - pairs.len();
        if skipped > 0 {
            warn!(prefix = %root, skipped, "Some parameters were left out of the tree");
        }

        debug!(prefix = %root, count = pairs.len(), "Read parameters");
        Ok(codec::unflatten(pairs))
    }

    async fn write(&self, namespace: &str, tree: &ConfigTree) -> Result<()> {
        let root = FlatPath::parse_prefix(namespace)?;
        // encode everything up front so a bad leaf fails before any put
        let requests = self.encode_leaves(&root, tree)?;
        let count = requests.len();

        let puts: Vec<_> = requests
            .into_iter()
            .map(|request| {
                debug!("Writing parameter {} ({:?})...", request.name, request.param_type);
                let backend = self.backend.clone();
                self.gate
                    .add(move || async move { backend.put_parameter(request).await })
            })
            .collect();
        futures::future::try_join_all(puts).await?;

        info!(prefix = %root, count, "Wrote parameters");
        Ok(())
    }

    async fn delete(&self, namespace: &str) -> Result<()> {
        self.delete_path(namespace, true).await.map(|_| ())
    }
}
