//! Parameter backend contract
//!
//! The operations a hierarchical parameter store has to offer: put one
//! value, list values below a path one page at a time, and delete names in
//! small batches.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Largest number of names one delete call may carry.
pub const MAX_DELETE_BATCH: usize = 10;

/// Storage type of a parameter value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParameterType {
    String,
    StringList,
    SecureString,
}

/// A stored parameter as returned by a listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub value: String,
    #[serde(rename = "type")]
    pub param_type: ParameterType,
    pub version: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PutParameter {
    pub name: String,
    pub value: String,
    pub overwrite: bool,
    pub param_type: ParameterType,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParameterFilter {
    pub key: String,
    pub values: Vec<String>,
}

/// One "list by path" request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GetParametersByPath {
    pub path: String,
    pub recursive: bool,
    pub with_decryption: bool,
    pub filters: Vec<ParameterFilter>,
    pub next_token: Option<String>,
}

/// One page of a listing. `next_token` is `None` on the last page.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParameterPage {
    pub parameters: Vec<Parameter>,
    pub next_token: Option<String>,
}

/// Result of a batch delete: names that were removed and names that did
/// not exist.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeleteOutcome {
    pub deleted: Vec<String>,
    pub invalid: Vec<String>,
}

#[async_trait]
pub trait ParameterBackend: Send + Sync {
    /// Store a value, returning the new parameter version.
    async fn put_parameter(&self, request: PutParameter) -> Result<u64>;

    async fn get_parameters_by_path(&self, request: GetParametersByPath) -> Result<ParameterPage>;

    /// Delete at most [`MAX_DELETE_BATCH`] names.
    async fn delete_parameters(&self, names: Vec<String>) -> Result<DeleteOutcome>;
}
