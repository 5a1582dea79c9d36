//! cfgsync client - hierarchical configuration sync across backends
//!
//! This crate provides:
//! - A codec between nested configuration trees and flat `/a/b/c` keys
//! - A rate-limited FIFO call gate shared by every backend call
//! - Paginated listing and batched deletion drivers
//! - A parameter-store adapter with an in-process local backend
//! - A read-only adapter over deployment stack outputs
//! - A service-group adapter for push-based supervisors

pub mod codec;
pub mod error;
pub mod habitat;
pub mod limiter;
pub mod params;
pub mod stack;
pub mod store;
pub mod tree;

pub use codec::{ArrayEncoding, FlatPath};
pub use error::{Result, SyncError};
pub use habitat::model::ServiceGroup;
pub use habitat::{ServiceGroupConfig, ServiceGroupStore};
pub use limiter::CallGate;
pub use params::backend::{ParameterBackend, ParameterType};
pub use params::local::LocalParameters;
pub use params::{ParameterStore, ParameterStoreConfig, ReadRoot};
pub use stack::{StackBackend, StackOutputs, StaticStacks};
pub use store::ConfigStore;
pub use tree::{ConfigTree, ConfigValue, Scalar};
