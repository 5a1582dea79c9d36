//! Supervisor gateway response types

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Entry of `GET /services`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEntry {
    pub service_group: String,
}

/// Body of `GET /census`.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Census {
    #[serde(default)]
    pub census_groups: HashMap<String, CensusGroup>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct CensusGroup {
    #[serde(default)]
    pub service_config: Option<ServiceConfig>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ServiceConfig {
    pub incarnation: u64,
}

/// A service group, optionally scoped to an organization.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ServiceGroup {
    pub service: String,
    pub group: String,
    pub org: Option<String>,
}

impl ServiceGroup {
    pub fn new(service: &str, group: &str) -> Self {
        Self {
            service: service.to_string(),
            group: group.to_string(),
            org: None,
        }
    }

    pub fn with_org(mut self, org: Option<&str>) -> Self {
        self.org = org.map(str::to_string);
        self
    }

    fn group_segment(&self) -> String {
        match &self.org {
            Some(org) => format!("{}@{}", self.group, org),
            None => self.group.clone(),
        }
    }

    /// Gateway path of this group's current configuration.
    pub fn config_path(&self) -> String {
        format!("/services/{}/{}/config", self.service, self.group_segment())
    }
}

/// The composite key, `service.group` or `service.group@org`.
impl fmt::Display for ServiceGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.service, self.group_segment())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_and_paths() {
        let sg = ServiceGroup::new("redis", "default");
        assert_eq!(sg.to_string(), "redis.default");
        assert_eq!(sg.config_path(), "/services/redis/default/config");

        let sg = sg.with_org(Some("acme"));
        assert_eq!(sg.to_string(), "redis.default@acme");
        assert_eq!(sg.config_path(), "/services/redis/default@acme/config");
    }

    #[test]
    fn test_census_parsing() {
        let census: Census = serde_json::from_str(
            r#"{
                "changed": false,
                "census_groups": {
                    "redis.default": {"service_config": {"incarnation": 7, "value": {}}},
                    "web.default": {"service_config": null}
                }
            }"#,
        )
        .unwrap();
        assert_eq!(
            census.census_groups["redis.default"]
                .service_config
                .as_ref()
                .unwrap()
                .incarnation,
            7
        );
        assert!(census.census_groups["web.default"].service_config.is_none());
    }
}
