//! Read-only store over deployment stack outputs

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, SyncError};
use crate::limiter::CallGate;
use crate::store::ConfigStore;
use crate::tree::{ConfigTree, ConfigValue};

/// Stack describe calls tolerate a higher rate than parameter writes.
pub const DEFAULT_STACK_REQUESTS_PER_SECOND: f64 = 10.0;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StackOutput {
    pub output_key: String,
    pub output_value: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StackDescription {
    pub stack_name: String,
    #[serde(default)]
    pub outputs: Vec<StackOutput>,
}

#[async_trait]
pub trait StackBackend: Send + Sync {
    /// Describe the named stack. An empty result means it does not exist.
    async fn describe_stacks(&self, stack_name: String) -> Result<Vec<StackDescription>>;
}

/// In-memory [`StackBackend`].
#[derive(Clone, Debug, Default)]
pub struct StaticStacks {
    stacks: HashMap<String, Vec<StackOutput>>,
}

impl StaticStacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stack<K, V>(mut self, name: &str, outputs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let outputs = outputs
            .into_iter()
            .map(|(k, v)| StackOutput {
                output_key: k.into(),
                output_value: v.into(),
            })
            .collect();
        self.stacks.insert(name.to_string(), outputs);
        self
    }
}

#[async_trait]
impl StackBackend for StaticStacks {
    async fn describe_stacks(&self, stack_name: String) -> Result<Vec<StackDescription>> {
        Ok(self
            .stacks
            .get(&stack_name)
            .map(|outputs| StackDescription {
                stack_name: stack_name.clone(),
                outputs: outputs.clone(),
            })
            .into_iter()
            .collect())
    }
}

/// Exposes the outputs of one stack as a flat tree of strings.
pub struct StackOutputs {
    backend: Arc<dyn StackBackend>,
    gate: CallGate,
}

impl StackOutputs {
    pub fn new(backend: Arc<dyn StackBackend>) -> Result<Self> {
        Self::with_rate(backend, DEFAULT_STACK_REQUESTS_PER_SECOND)
    }

    pub fn with_rate(backend: Arc<dyn StackBackend>, requests_per_second: f64) -> Result<Self> {
        Ok(Self {
            backend,
            gate: CallGate::new(requests_per_second)?,
        })
    }
}

#[async_trait]
impl ConfigStore for StackOutputs {
    fn kind(&self) -> &'static str {
        "stack-outputs"
    }

    async fn read(&self, namespace: &str) -> Result<ConfigTree> {
        debug!("Describing stack {}...", namespace);
        let backend = self.backend.clone();
        let name = namespace.to_string();
        let stacks = self
            .gate
            .add(move || async move { backend.describe_stacks(name).await })
            .await?;

        let stack = stacks
            .into_iter()
            .next()
            .ok_or_else(|| SyncError::StackNotFound(namespace.to_string()))?;
        Ok(stack
            .outputs
            .into_iter()
            .map(|o| (o.output_key, ConfigValue::from(o.output_value)))
            .collect())
    }

    async fn write(&self, _namespace: &str, _tree: &ConfigTree) -> Result<()> {
        Err(SyncError::unsupported("stack outputs are read-only"))
    }

    async fn delete(&self, _namespace: &str) -> Result<()> {
        Err(SyncError::unsupported("stack outputs are read-only"))
    }
}
