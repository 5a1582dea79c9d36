//! Settings for the command line tool
//!
//! Sources, lowest precedence first: `conf/cfgsync.yml` (or the file given
//! with `--config`), `CFGSYNC__SECTION__KEY` environment variables, then
//! command line overrides.

use std::path::Path;

use cfgsync_client::{
    ArrayEncoding, ParameterStoreConfig, ReadRoot, ServiceGroupConfig,
    params::DEFAULT_REQUESTS_PER_SECOND, params::local::DEFAULT_PAGE_SIZE,
};
use ::config::{Config, Environment, File};

use crate::logging::LoggingConfig;

const DEFAULT_CONFIG_FILE: &str = "conf/cfgsync.yml";
const DEFAULT_PARAMETERS_FILE: &str = "data/parameters.json";

pub const PARAMETERS_FILE: &str = "parameters.file";
pub const PARAMETERS_PAGE_SIZE: &str = "parameters.page_size";
pub const PARAMETERS_REQUESTS_PER_SECOND: &str = "parameters.requests_per_second";
pub const PARAMETERS_ARRAY_ENCODING: &str = "parameters.array_encoding";
pub const PARAMETERS_READ_ROOT: &str = "parameters.read_root";
pub const PARAMETERS_MAX_PAGES: &str = "parameters.max_pages";
pub const PARAMETERS_SECURE: &str = "parameters.secure";
pub const HABITAT_HTTP_ADDR: &str = "habitat.http_addr";
pub const HABITAT_SUP_ADDR: &str = "habitat.sup_addr";
pub const HABITAT_COMMAND: &str = "habitat.command";
pub const LOGGING_LEVEL: &str = "logging.level";
pub const LOGGING_DIR: &str = "logging.dir";

/// Loaded settings with typed accessors
#[derive(Clone, Debug, Default)]
pub struct Configuration {
    pub config: Config,
}

impl Configuration {
    /// Loads settings. An explicit `path` must exist; the default file is
    /// optional.
    pub fn load(path: Option<&Path>, overrides: &[(&str, String)]) -> anyhow::Result<Self> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let mut builder = Config::builder().add_source(file).add_source(
            Environment::with_prefix("CFGSYNC")
                .separator("__")
                .try_parsing(true),
        );
        for (key, value) in overrides {
            builder = builder.set_override(*key, value.as_str())?;
        }

        Ok(Configuration {
            config: builder.build()?,
        })
    }

    // ========================================================================
    // Parameter store
    // ========================================================================

    pub fn parameters_file(&self) -> String {
        self.config
            .get_string(PARAMETERS_FILE)
            .unwrap_or(DEFAULT_PARAMETERS_FILE.to_string())
    }

    pub fn parameters_page_size(&self) -> usize {
        self.config
            .get_int(PARAMETERS_PAGE_SIZE)
            .ok()
            .and_then(|v| usize::try_from(v).ok())
            .unwrap_or(DEFAULT_PAGE_SIZE)
    }

    pub fn parameter_store(&self) -> anyhow::Result<ParameterStoreConfig> {
        let requests_per_second = self
            .config
            .get_float(PARAMETERS_REQUESTS_PER_SECOND)
            .unwrap_or(DEFAULT_REQUESTS_PER_SECOND);
        let array_encoding = match self.config.get_string(PARAMETERS_ARRAY_ENCODING) {
            Ok(v) => parse_array_encoding(&v)?,
            Err(_) => ArrayEncoding::default(),
        };
        let read_root = match self.config.get_string(PARAMETERS_READ_ROOT) {
            Ok(v) => parse_read_root(&v)?,
            Err(_) => ReadRoot::default(),
        };
        let max_pages = self
            .config
            .get_int(PARAMETERS_MAX_PAGES)
            .ok()
            .and_then(|v| u32::try_from(v).ok());
        let secure = self.config.get_bool(PARAMETERS_SECURE).unwrap_or(true);

        Ok(ParameterStoreConfig::default()
            .with_rate(requests_per_second)
            .with_array_encoding(array_encoding)
            .with_read_root(read_root)
            .with_max_pages(max_pages)
            .with_secure(secure))
    }

    // ========================================================================
    // Service groups
    // ========================================================================

    pub fn service_group(&self) -> anyhow::Result<ServiceGroupConfig> {
        let defaults = ServiceGroupConfig::default();
        let http_addr = self
            .config
            .get_string(HABITAT_HTTP_ADDR)
            .unwrap_or(defaults.http_addr.clone());
        let sup_addr = self
            .config
            .get_string(HABITAT_SUP_ADDR)
            .unwrap_or(defaults.sup_addr.clone());
        let command = self
            .config
            .get_string(HABITAT_COMMAND)
            .unwrap_or(defaults.apply_program.clone());

        let mut words = command.split_whitespace();
        let program = words
            .next()
            .ok_or_else(|| anyhow::anyhow!("{} must not be empty", HABITAT_COMMAND))?;
        let args: Vec<&str> = words.collect();

        Ok(ServiceGroupConfig::new(&http_addr, &sup_addr).with_apply_command(program, &args))
    }

    // ========================================================================
    // Logging
    // ========================================================================

    pub fn logging(&self) -> LoggingConfig {
        LoggingConfig::from_config(
            self.config.get_string(LOGGING_LEVEL).ok(),
            self.config.get_string(LOGGING_DIR).ok(),
        )
    }
}

fn parse_array_encoding(value: &str) -> anyhow::Result<ArrayEncoding> {
    match value.to_ascii_lowercase().as_str() {
        "json" => Ok(ArrayEncoding::Json),
        "delimited" => Ok(ArrayEncoding::Delimited),
        other => anyhow::bail!(
            "unknown {} {:?}, expected json or delimited",
            PARAMETERS_ARRAY_ENCODING,
            other
        ),
    }
}

fn parse_read_root(value: &str) -> anyhow::Result<ReadRoot> {
    match value.to_ascii_lowercase().as_str() {
        "stripped" => Ok(ReadRoot::Stripped),
        "prefixed" => Ok(ReadRoot::Prefixed),
        other => anyhow::bail!(
            "unknown {} {:?}, expected stripped or prefixed",
            PARAMETERS_READ_ROOT,
            other
        ),
    }
}
