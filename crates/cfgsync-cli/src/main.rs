//! cfgsync - move hierarchical configuration between stores

mod config;
mod logging;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use cfgsync_client::{
    ConfigStore, ConfigTree, LocalParameters, ParameterStore, ServiceGroup, ServiceGroupStore,
};
use clap::{Args, Parser, Subcommand};
use tracing::info;

use crate::config::Configuration;
use crate::logging::init_logging;

#[derive(Debug, Parser)]
#[command(name = "cfgsync", version, about = "Synchronize hierarchical configuration")]
struct Cli {
    /// Settings file (default: conf/cfgsync.yml if present)
    #[arg(short = 'c', long = "config", global = true)]
    config: Option<PathBuf>,
    /// Local parameter snapshot file
    #[arg(long = "params-file", global = true)]
    params_file: Option<String>,
    /// Supervisor HTTP gateway, e.g. http://127.0.0.1:9631
    #[arg(long = "hab-http", global = true)]
    hab_http: Option<String>,
    /// Supervisor control address, e.g. 127.0.0.1:9632
    #[arg(long = "hab-sup", global = true)]
    hab_sup: Option<String>,
    /// Log level when RUST_LOG is unset
    #[arg(long = "log-level", global = true)]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Parameter store operations
    #[command(subcommand)]
    Params(ParamsCommand),
    /// Service-group operations
    #[command(subcommand)]
    Hab(HabCommand),
    /// Copy a service group's configuration under a parameter prefix
    CopyHabToParams {
        #[command(flatten)]
        group: GroupArgs,
        prefix: String,
    },
}

#[derive(Debug, Subcommand)]
enum ParamsCommand {
    /// Print the tree stored below a prefix as JSON
    Read { prefix: String },
    /// Store a JSON or TOML file below a prefix
    Write { prefix: String, file: PathBuf },
    /// Delete everything below a prefix
    Delete { prefix: String },
}

#[derive(Debug, Subcommand)]
enum HabCommand {
    /// Print a service group's configuration as JSON
    Read(GroupArgs),
    /// Exit with status 0 if the service group is known, 1 otherwise
    Exists(GroupArgs),
    /// Print the applied configuration version
    Version(GroupArgs),
    /// Apply a JSON or TOML file to a service group
    Write {
        #[command(flatten)]
        group: GroupArgs,
        file: PathBuf,
        /// Configuration version (default: current version + 1)
        #[arg(long)]
        version: Option<u64>,
    },
}

#[derive(Debug, Args)]
struct GroupArgs {
    service: String,
    group: String,
    #[arg(long)]
    org: Option<String>,
}

impl GroupArgs {
    fn service_group(&self) -> ServiceGroup {
        ServiceGroup::new(&self.service, &self.group).with_org(self.org.as_deref())
    }
}

impl Cli {
    fn overrides(&self) -> Vec<(&'static str, String)> {
        let mut overrides = Vec::new();
        if let Some(v) = &self.params_file {
            overrides.push((config::PARAMETERS_FILE, v.clone()));
        }
        if let Some(v) = &self.hab_http {
            overrides.push((config::HABITAT_HTTP_ADDR, v.clone()));
        }
        if let Some(v) = &self.hab_sup {
            overrides.push((config::HABITAT_SUP_ADDR, v.clone()));
        }
        if let Some(v) = &self.log_level {
            overrides.push((config::LOGGING_LEVEL, v.clone()));
        }
        overrides
    }
}

fn read_tree(file: &Path) -> anyhow::Result<ConfigTree> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let tree = match file.extension().and_then(|e| e.to_str()) {
        Some("toml") => toml::from_str(&text)?,
        _ => serde_json::from_str(&text)?,
    };
    Ok(tree)
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn parameter_store(configuration: &Configuration) -> anyhow::Result<ParameterStore> {
    let backend = LocalParameters::open(configuration.parameters_file())
        .await?
        .with_page_size(configuration.parameters_page_size());
    Ok(ParameterStore::new(
        Arc::new(backend),
        configuration.parameter_store()?,
    )?)
}

fn service_group_store(configuration: &Configuration) -> anyhow::Result<ServiceGroupStore> {
    Ok(ServiceGroupStore::new(configuration.service_group()?)?)
}

async fn run_params(configuration: &Configuration, command: ParamsCommand) -> anyhow::Result<()> {
    let store = parameter_store(configuration).await?;
    match command {
        ParamsCommand::Read { prefix } => print_json(&store.read(&prefix).await?),
        ParamsCommand::Write { prefix, file } => {
            let tree = read_tree(&file)?;
            store.write(&prefix, &tree).await?;
            Ok(())
        }
        ParamsCommand::Delete { prefix } => {
            let deleted = store.delete_path(&prefix, true).await?;
            println!("{}", deleted);
            Ok(())
        }
    }
}

async fn run_hab(
    configuration: &Configuration,
    command: HabCommand,
) -> anyhow::Result<ExitCode> {
    let store = service_group_store(configuration)?;
    match command {
        HabCommand::Read(args) => {
            print_json(&store.read(&args.service_group()).await?)?;
            Ok(ExitCode::SUCCESS)
        }
        HabCommand::Exists(args) => {
            let sg = args.service_group();
            if store.has_service_group(&sg).await? {
                println!("{}", sg);
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::FAILURE)
            }
        }
        HabCommand::Version(args) => {
            match store.get_version(&args.service_group()).await? {
                Some(version) => println!("{}", version),
                None => println!("none"),
            }
            Ok(ExitCode::SUCCESS)
        }
        HabCommand::Write {
            group,
            file,
            version,
        } => {
            let sg = group.service_group();
            let tree = read_tree(&file)?;
            let version = match version {
                Some(v) => v,
                None => store.get_version(&sg).await?.map_or(1, |v| v + 1),
            };
            store.write(&sg, &tree, version).await?;
            println!("{}", version);
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn copy_hab_to_params(
    configuration: &Configuration,
    group: GroupArgs,
    prefix: String,
) -> anyhow::Result<()> {
    let hab = service_group_store(configuration)?;
    let params = parameter_store(configuration).await?;

    let sg = group.service_group();
    let tree = hab.read(&sg).await?;
    params.write(&prefix, &tree).await?;
    info!(service_group = %sg, prefix = %prefix, keys = tree.len(), "Copied configuration");
    Ok(())
}

async fn run(cli: Cli, configuration: &Configuration) -> anyhow::Result<ExitCode> {
    match cli.command {
        Command::Params(command) => run_params(configuration, command)
            .await
            .map(|()| ExitCode::SUCCESS),
        Command::Hab(command) => run_hab(configuration, command).await,
        Command::CopyHabToParams { group, prefix } => {
            copy_hab_to_params(configuration, group, prefix)
                .await
                .map(|()| ExitCode::SUCCESS)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let configuration = Configuration::load(cli.config.as_deref(), &cli.overrides())?;
    // dropped on every return path so the file writer flushes
    let _guard = init_logging(&configuration.logging())?;

    run(cli, &configuration).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_hab_write() {
        let cli = Cli::try_parse_from([
            "cfgsync", "hab", "write", "redis", "default", "cfg.toml", "--version", "3", "--org",
            "acme",
        ])
        .unwrap();
        match cli.command {
            Command::Hab(HabCommand::Write {
                group,
                file,
                version,
            }) => {
                assert_eq!(group.service_group().to_string(), "redis.default@acme");
                assert_eq!(file, PathBuf::from("cfg.toml"));
                assert_eq!(version, Some(3));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_overrides() {
        let cli = Cli::try_parse_from([
            "cfgsync",
            "--params-file",
            "/tmp/p.json",
            "params",
            "read",
            "/svc",
        ])
        .unwrap();
        assert_eq!(
            cli.overrides(),
            vec![(crate::config::PARAMETERS_FILE, "/tmp/p.json".to_string())]
        );
    }

    #[tokio::test]
    async fn test_exists_exit_codes() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::path("/services"))
            .respond_with(
                wiremock::ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!([{"service_group": "redis.default"}])),
            )
            .mount(&server)
            .await;
        let overrides = [(crate::config::HABITAT_HTTP_ADDR, server.uri())];
        let configuration = Configuration::load(None, &overrides).unwrap();

        let known = Cli::try_parse_from(["cfgsync", "hab", "exists", "redis", "default"]).unwrap();
        assert_eq!(run(known, &configuration).await.unwrap(), ExitCode::SUCCESS);

        let unknown = Cli::try_parse_from(["cfgsync", "hab", "exists", "web", "default"]).unwrap();
        assert_eq!(run(unknown, &configuration).await.unwrap(), ExitCode::FAILURE);
    }

    #[test]
    fn test_read_tree_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let toml_file = dir.path().join("cfg.toml");
        std::fs::write(&toml_file, "port = 1\n[tls]\nenabled = true\n").unwrap();
        let json_file = dir.path().join("cfg.json");
        std::fs::write(&json_file, r#"{"port": 1, "tls": {"enabled": true}}"#).unwrap();

        assert_eq!(read_tree(&toml_file).unwrap(), read_tree(&json_file).unwrap());
    }
}
