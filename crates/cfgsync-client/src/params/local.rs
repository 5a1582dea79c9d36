//! Local parameter backend
//!
//! An in-process [`ParameterBackend`] with the same restrictions as the
//! hosted store's offline emulation: overwrite-only puts, recursive-only
//! listings, no filters, no list types. It can optionally keep a JSON
//! snapshot on disk so a store survives between runs.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use super::backend::{
    DeleteOutcome, GetParametersByPath, MAX_DELETE_BATCH, Parameter, ParameterBackend,
    ParameterPage, ParameterType, PutParameter,
};
use crate::codec::{FlatPath, PATH_SEPARATOR};
use crate::error::{Result, SyncError};

/// Default number of parameters per listing page.
pub const DEFAULT_PAGE_SIZE: usize = 10;

#[derive(Clone, Debug, Serialize, Deserialize)]
struct StoredParameter {
    value: String,
    #[serde(rename = "type")]
    param_type: ParameterType,
    version: u64,
}

type Entries = BTreeMap<String, StoredParameter>;

pub struct LocalParameters {
    entries: Mutex<Entries>,
    snapshot: Option<PathBuf>,
    page_size: usize,
}

impl LocalParameters {
    /// A store that lives only as long as this value.
    pub fn in_memory() -> Self {
        Self {
            entries: Mutex::new(Entries::new()),
            snapshot: None,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Opens a store backed by a JSON snapshot file. A missing file is an
    /// empty store; it is created on the first mutation.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Entries::new(),
            Err(e) => return Err(e.into()),
        };
        debug!(path = %path.display(), count = entries.len(), "Opened local parameter store");
        Ok(Self {
            entries: Mutex::new(entries),
            snapshot: Some(path),
            page_size: DEFAULT_PAGE_SIZE,
        })
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Raw stored value of one parameter.
    pub async fn get(&self, name: &str) -> Option<Parameter> {
        self.entries
            .lock()
            .await
            .get(name)
            .map(|stored| to_parameter(name, stored))
    }

    async fn persist(&self, entries: &Entries) -> Result<()> {
        let Some(path) = &self.snapshot else {
            return Ok(());
        };
        write_snapshot(path, entries).await
    }
}

async fn write_snapshot(path: &Path, entries: &Entries) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, serde_json::to_vec_pretty(entries)?).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

fn to_parameter(name: &str, stored: &StoredParameter) -> Parameter {
    Parameter {
        name: name.to_string(),
        value: stored.value.clone(),
        param_type: stored.param_type,
        version: stored.version,
    }
}

#[async_trait]
impl ParameterBackend for LocalParameters {
    async fn put_parameter(&self, request: PutParameter) -> Result<u64> {
        if !request.overwrite {
            return Err(SyncError::unsupported("non-overwriting put"));
        }
        if request.param_type == ParameterType::StringList {
            return Err(SyncError::unsupported(format!(
                "parameter type {:?}",
                request.param_type
            )));
        }
        FlatPath::parse(&request.name)?;

        let mut entries = self.entries.lock().await;
        let version = entries.get(&request.name).map_or(1, |p| p.version + 1);
        let previous = entries.insert(
            request.name.clone(),
            StoredParameter {
                value: request.value,
                param_type: request.param_type,
                version,
            },
        );
        if let Err(e) = self.persist(&entries).await {
            // memory must not run ahead of the snapshot
            match previous {
                Some(stored) => entries.insert(request.name, stored),
                None => entries.remove(&request.name),
            };
            return Err(e);
        }
        Ok(version)
    }

    async fn get_parameters_by_path(&self, request: GetParametersByPath) -> Result<ParameterPage> {
        if !request.recursive {
            return Err(SyncError::unsupported("non-recursive listing"));
        }
        if !request.filters.is_empty() {
            return Err(SyncError::unsupported("parameter filters"));
        }

        // values are kept in plain text, so decryption is a no-op here
        let base = request.path.trim_end_matches(PATH_SEPARATOR);
        let children = format!("{}{}", base, PATH_SEPARATOR);
        let start = match request.next_token {
            Some(token) => Bound::Excluded(token),
            None => Bound::Included(children.clone()),
        };

        let entries = self.entries.lock().await;
        let mut parameters = Vec::new();
        let mut more = false;
        for (name, stored) in entries.range((start, Bound::Unbounded)) {
            if !name.starts_with(&children) {
                break;
            }
            if parameters.len() == self.page_size {
                more = true;
                break;
            }
            parameters.push(to_parameter(name, stored));
        }

        let next_token = if more {
            parameters.last().map(|p: &Parameter| p.name.clone())
        } else {
            None
        };
        Ok(ParameterPage {
            parameters,
            next_token,
        })
    }

    async fn delete_parameters(&self, names: Vec<String>) -> Result<DeleteOutcome> {
        if names.len() > MAX_DELETE_BATCH {
            return Err(SyncError::Backend(format!(
                "cannot delete {} parameters in one call (max {})",
                names.len(),
                MAX_DELETE_BATCH
            )));
        }

        let mut entries = self.entries.lock().await;
        let mut outcome = DeleteOutcome::default();
        let mut removed = Vec::new();
        for name in names {
            match entries.remove(&name) {
                Some(stored) => {
                    removed.push((name.clone(), stored));
                    outcome.deleted.push(name);
                }
                None => outcome.invalid.push(name),
            }
        }
        if !removed.is_empty()
            && let Err(e) = self.persist(&entries).await
        {
            entries.extend(removed);
            return Err(e);
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put(name: &str, value: &str) -> PutParameter {
        PutParameter {
            name: name.to_string(),
            value: value.to_string(),
            overwrite: true,
            param_type: ParameterType::SecureString,
        }
    }

    fn list(path: &str, next_token: Option<String>) -> GetParametersByPath {
        GetParametersByPath {
            path: path.to_string(),
            recursive: true,
            with_decryption: true,
            filters: Vec::new(),
            next_token,
        }
    }

    #[tokio::test]
    async fn test_put_bumps_version() {
        let store = LocalParameters::in_memory();
        assert_eq!(store.put_parameter(put("/svc/a", "1")).await.unwrap(), 1);
        assert_eq!(store.put_parameter(put("/svc/a", "2")).await.unwrap(), 2);
        assert_eq!(store.get("/svc/a").await.unwrap().value, "2");
    }

    #[tokio::test]
    async fn test_put_restrictions() {
        let store = LocalParameters::in_memory();

        let mut req = put("/svc/a", "1");
        req.overwrite = false;
        assert!(matches!(
            store.put_parameter(req).await,
            Err(SyncError::Unsupported(_))
        ));

        let mut req = put("/svc/a", "x,y");
        req.param_type = ParameterType::StringList;
        assert!(matches!(
            store.put_parameter(req).await,
            Err(SyncError::Unsupported(_))
        ));

        assert!(matches!(
            store.put_parameter(put("/svc//a", "1")).await,
            Err(SyncError::InvalidPath(_))
        ));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_listing_is_scoped_and_paged() {
        let store = LocalParameters::in_memory().with_page_size(2);
        for name in ["/svc/a", "/svc/b/c", "/svc/d", "/svc-other/x", "/sv/y"] {
            store.put_parameter(put(name, "1")).await.unwrap();
        }

        let first = store.get_parameters_by_path(list("/svc", None)).await.unwrap();
        let names: Vec<&str> = first.parameters.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["/svc/a", "/svc/b/c"]);
        assert_eq!(first.next_token.as_deref(), Some("/svc/b/c"));

        let second = store
            .get_parameters_by_path(list("/svc", first.next_token))
            .await
            .unwrap();
        let names: Vec<&str> = second.parameters.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["/svc/d"]);
        assert_eq!(second.next_token, None);
    }

    #[tokio::test]
    async fn test_listing_restrictions() {
        let store = LocalParameters::in_memory();

        let mut req = list("/svc", None);
        req.recursive = false;
        assert!(matches!(
            store.get_parameters_by_path(req).await,
            Err(SyncError::Unsupported(_))
        ));

        let mut req = list("/svc", None);
        req.filters.push(crate::params::backend::ParameterFilter {
            key: "Type".into(),
            values: vec!["String".into()],
        });
        assert!(matches!(
            store.get_parameters_by_path(req).await,
            Err(SyncError::Unsupported(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_snapshot_leaves_store_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocked");
        let store = LocalParameters::open(blocker.join("params.json"))
            .await
            .unwrap();
        // the snapshot directory cannot be created over a plain file
        std::fs::write(&blocker, "").unwrap();

        assert!(store.put_parameter(put("/svc/a", "1")).await.is_err());
        assert!(store.get("/svc/a").await.is_none());
        assert!(store.is_empty().await);

        std::fs::remove_file(&blocker).unwrap();
        store.put_parameter(put("/svc/a", "1")).await.unwrap();
        std::fs::remove_dir_all(&blocker).unwrap();
        std::fs::write(&blocker, "").unwrap();

        assert!(
            store
                .delete_parameters(vec!["/svc/a".into()])
                .await
                .is_err()
        );
        assert_eq!(store.get("/svc/a").await.unwrap().value, "1");
    }

    #[tokio::test]
    async fn test_delete_reports_invalid_names() {
        let store = LocalParameters::in_memory();
        store.put_parameter(put("/svc/a", "1")).await.unwrap();

        let outcome = store
            .delete_parameters(vec!["/svc/a".into(), "/svc/missing".into()])
            .await
            .unwrap();
        assert_eq!(outcome.deleted, vec!["/svc/a"]);
        assert_eq!(outcome.invalid, vec!["/svc/missing"]);

        let too_many = (0..11).map(|i| format!("/svc/{}", i)).collect();
        assert!(matches!(
            store.delete_parameters(too_many).await,
            Err(SyncError::Backend(_))
        ));
    }

    #[tokio::test]
    async fn test_snapshot_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store").join("params.json");

        let store = LocalParameters::open(&path).await.unwrap();
        store.put_parameter(put("/svc/a", "\"x\"")).await.unwrap();
        store.put_parameter(put("/svc/b", "2")).await.unwrap();
        store.delete_parameters(vec!["/svc/b".into()]).await.unwrap();
        drop(store);

        let reopened = LocalParameters::open(&path).await.unwrap();
        assert_eq!(reopened.len().await, 1);
        let param = reopened.get("/svc/a").await.unwrap();
        assert_eq!(param.value, "\"x\"");
        assert_eq!(param.param_type, ParameterType::SecureString);
    }
}
