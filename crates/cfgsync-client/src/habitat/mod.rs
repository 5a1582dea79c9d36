//! Service-group configuration adapter
//!
//! Talks to a push-based supervisor: configuration is read through its
//! HTTP gateway and written by piping TOML into a versioned apply command
//! aimed at the supervisor's control address.

pub mod apply;
pub mod http;
pub mod model;

use serde::de::IgnoredAny;
use tracing::{debug, info};

use self::http::{HttpClientConfig, SupervisorHttpClient};
use self::model::{Census, ServiceEntry, ServiceGroup};
use crate::error::{Result, SyncError};
use crate::tree::{ConfigTree, sanitize};

const SERVICES_PATH: &str = "/services";
const CENSUS_PATH: &str = "/census";

/// Configuration for [`ServiceGroupStore`]
#[derive(Clone, Debug)]
pub struct ServiceGroupConfig {
    /// HTTP gateway base URL
    pub http_addr: String,
    /// Control address handed to the apply command
    pub sup_addr: String,
    /// Apply program, e.g. "hab"
    pub apply_program: String,
    /// Arguments placed before `config apply ...`
    pub apply_args: Vec<String>,
    /// Connection timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Read timeout in milliseconds
    pub read_timeout_ms: u64,
}

impl Default for ServiceGroupConfig {
    fn default() -> Self {
        Self {
            http_addr: "http://127.0.0.1:9631".to_string(),
            sup_addr: "127.0.0.1:9632".to_string(),
            apply_program: "hab".to_string(),
            apply_args: Vec::new(),
            connect_timeout_ms: 5000,
            read_timeout_ms: 30000,
        }
    }
}

impl ServiceGroupConfig {
    pub fn new(http_addr: &str, sup_addr: &str) -> Self {
        Self {
            http_addr: http_addr.to_string(),
            sup_addr: sup_addr.to_string(),
            ..Default::default()
        }
    }

    /// Set the apply program and any arguments that precede
    /// `config apply`.
    pub fn with_apply_command(mut self, program: &str, args: &[&str]) -> Self {
        self.apply_program = program.to_string();
        self.apply_args = args.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn with_timeouts(mut self, connect_ms: u64, read_ms: u64) -> Self {
        self.connect_timeout_ms = connect_ms;
        self.read_timeout_ms = read_ms;
        self
    }
}

/// Reads and applies service-group configuration.
pub struct ServiceGroupStore {
    http: SupervisorHttpClient,
    config: ServiceGroupConfig,
}

impl ServiceGroupStore {
    pub fn new(config: ServiceGroupConfig) -> Result<Self> {
        let http = SupervisorHttpClient::new(
            HttpClientConfig::new(&config.http_addr)
                .with_timeouts(config.connect_timeout_ms, config.read_timeout_ms),
        )?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ServiceGroupConfig {
        &self.config
    }

    async fn is_listed(&self, sg: &ServiceGroup) -> Result<bool> {
        let services: Vec<ServiceEntry> = self
            .http
            .get_optional(SERVICES_PATH)
            .await?
            .ok_or_else(|| SyncError::RequestFailed {
                status: 404,
                message: "service listing not available".to_string(),
            })?;
        let key = sg.to_string();
        Ok(services.iter().any(|s| s.service_group == key))
    }

    /// Whether the supervisor knows `sg`, even if it has no configuration
    /// yet.
    pub async fn has_service_group(&self, sg: &ServiceGroup) -> Result<bool> {
        match self.http.get_optional::<IgnoredAny>(&sg.config_path()).await? {
            Some(_) => Ok(true),
            None => self.is_listed(sg).await,
        }
    }

    /// Current configuration of `sg`, with empty groups removed.
    ///
    /// A known group without published configuration reads as an empty
    /// tree; an unknown group is [`SyncError::ServiceGroupNotFound`].
    pub async fn read(&self, sg: &ServiceGroup) -> Result<ConfigTree> {
        debug!("Requesting config for {}.", sg);
        match self.http.get_optional::<ConfigTree>(&sg.config_path()).await? {
            Some(tree) => Ok(sanitize(&tree)),
            None if self.is_listed(sg).await? => Ok(ConfigTree::new()),
            None => Err(SyncError::ServiceGroupNotFound(sg.to_string())),
        }
    }

    /// Applies `tree` as configuration `version` of `sg`.
    ///
    /// The version is not derived here: callers read it with
    /// [`ServiceGroupStore::get_version`] and pick the next one themselves.
    pub async fn write(&self, sg: &ServiceGroup, tree: &ConfigTree, version: u64) -> Result<()> {
        let input = toml::to_string(tree)?;
        let mut args = self.config.apply_args.clone();
        args.extend([
            "config".to_string(),
            "apply".to_string(),
            "-r".to_string(),
            self.config.sup_addr.clone(),
            sg.to_string(),
            version.to_string(),
        ]);

        apply::run_with_input(&self.config.apply_program, &args, &input).await?;
        info!(service_group = %sg, version, "Applied configuration");
        Ok(())
    }

    /// Incarnation of the configuration currently applied to `sg`, or
    /// `None` if none has ever been applied.
    pub async fn get_version(&self, sg: &ServiceGroup) -> Result<Option<u64>> {
        let census: Census =
            self.http
                .get_optional(CENSUS_PATH)
                .await?
                .ok_or_else(|| SyncError::RequestFailed {
                    status: 404,
                    message: "census not available".to_string(),
                })?;
        Ok(census
            .census_groups
            .get(&sg.to_string())
            .and_then(|group| group.service_config.as_ref())
            .map(|config| config.incarnation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = ServiceGroupConfig::new("http://sup:9631", "sup:9632")
            .with_apply_command("sudo", &["hab"])
            .with_timeouts(1000, 2000);
        assert_eq!(config.http_addr, "http://sup:9631");
        assert_eq!(config.sup_addr, "sup:9632");
        assert_eq!(config.apply_program, "sudo");
        assert_eq!(config.apply_args, vec!["hab"]);
        assert_eq!(config.connect_timeout_ms, 1000);
        assert_eq!(config.read_timeout_ms, 2000);
    }

    #[test]
    fn test_config_default() {
        let config = ServiceGroupConfig::default();
        assert_eq!(config.apply_program, "hab");
        assert!(config.apply_args.is_empty());
        assert_eq!(config.sup_addr, "127.0.0.1:9632");
    }
}
