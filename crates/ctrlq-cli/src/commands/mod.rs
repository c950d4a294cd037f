//! CLI command definitions and handlers.

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

use ctrlq_graph::TaskGraph;
use ctrlq_qrs::QrsClient;
use ctrlq_session::{AuthMethod, RestClient, SessionConfig};

pub mod serve;
pub mod task_cp_set;
pub mod task_get;
pub mod task_import;

/// Ctrl-Q - Bulk operations for Qlik Sense Enterprise on Windows
#[derive(Parser)]
#[command(name = "ctrlq")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Connection flags, each mirrored by a CTRLQ_* environment variable.
/// Explicit flags override the environment.
#[derive(Args, Clone)]
pub struct ConnectionArgs {
    /// QSEoW host name
    #[arg(long, global = true, env = "CTRLQ_HOST", default_value = "")]
    pub host: String,

    /// Repository (QRS) port
    #[arg(long, global = true, env = "CTRLQ_QRS_PORT", default_value_t = 4242)]
    pub qrs_port: u16,

    /// Engine port
    #[arg(long, global = true, env = "CTRLQ_ENGINE_PORT", default_value_t = 4747)]
    pub engine_port: u16,

    /// Virtual proxy prefix, without slashes
    #[arg(long, global = true, env = "CTRLQ_VIRTUAL_PROXY", default_value = "")]
    pub virtual_proxy: String,

    /// Verify the server certificate (--secure false to disable)
    #[arg(
        long,
        global = true,
        env = "CTRLQ_SECURE",
        default_value_t = true,
        action = ArgAction::Set,
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    pub secure: bool,

    /// Engine API schema version
    #[arg(
        long,
        global = true,
        env = "CTRLQ_SCHEMA_VERSION",
        default_value = "12.612.0"
    )]
    pub schema_version: String,

    /// Client certificate PEM file
    #[arg(long, global = true, env = "CTRLQ_AUTH_CERT_FILE")]
    pub auth_cert_file: Option<PathBuf>,

    /// Client certificate key PEM file
    #[arg(long, global = true, env = "CTRLQ_AUTH_CERT_KEY_FILE")]
    pub auth_cert_key_file: Option<PathBuf>,

    /// Root certificate PEM file
    #[arg(long, global = true, env = "CTRLQ_AUTH_ROOT_CERT_FILE")]
    pub auth_root_cert_file: Option<PathBuf>,

    /// Bearer token (JWT) auth, instead of certificates
    #[arg(long, global = true, env = "CTRLQ_AUTH_BEARER_TOKEN")]
    pub auth_bearer_token: Option<String>,
}

impl ConnectionArgs {
    /// Validate the flag combination and load credential material. All
    /// configuration failures happen here, before any network I/O.
    pub fn session_config(&self) -> Result<SessionConfig> {
        if self.host.is_empty() {
            bail!("no host given; use --host or CTRLQ_HOST");
        }

        let cert_flags = [
            &self.auth_cert_file,
            &self.auth_cert_key_file,
            &self.auth_root_cert_file,
        ];
        let cert_count = cert_flags.iter().filter(|f| f.is_some()).count();

        let auth = match (&self.auth_bearer_token, cert_count) {
            (Some(_), n) if n > 0 => {
                bail!("certificate and bearer token auth are mutually exclusive")
            }
            (Some(token), _) => AuthMethod::Bearer(token.clone()),
            (None, 3) => {
                let (Some(cert), Some(key), Some(root)) = (
                    &self.auth_cert_file,
                    &self.auth_cert_key_file,
                    &self.auth_root_cert_file,
                ) else {
                    bail!("certificate auth needs cert, key, and root cert files");
                };
                AuthMethod::from_cert_files(cert, key, root)
                    .context("failed to load certificate files")?
            }
            (None, 0) => bail!("no auth given; provide certificate files or a bearer token"),
            (None, _) => bail!("certificate auth needs cert, key, and root cert files"),
        };

        let mut config = SessionConfig::new(self.host.clone(), auth);
        config.qrs_port = self.qrs_port;
        config.engine_port = self.engine_port;
        config.virtual_proxy = self.virtual_proxy.trim_matches('/').to_string();
        config.secure = self.secure;
        config.schema_version = self.schema_version.clone();
        Ok(config)
    }

    pub fn qrs_client(&self) -> Result<QrsClient> {
        let rest = RestClient::new(self.session_config()?)?;
        Ok(QrsClient::new(rest))
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Get tasks and their trigger graph as a tree or table
    TaskGet(task_get::TaskGetArgs),

    /// Import tasks (and optionally apps) from a source file
    TaskImport(task_import::TaskImportArgs),

    /// Set a custom property on existing tasks
    TaskCustomPropertySet(task_cp_set::TaskCpSetArgs),

    /// Serve the task network visualization
    TaskNetworkServe(serve::ServeArgs),
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::TaskGet(args) => task_get::execute(args, &self.connection).await,
            Commands::TaskImport(args) => task_import::execute(args, &self.connection).await,
            Commands::TaskCustomPropertySet(args) => {
                task_cp_set::execute(args, &self.connection).await
            }
            Commands::TaskNetworkServe(args) => serve::execute(args, &self.connection).await,
        }
    }
}

/// Fetch the full task population and assemble the graph.
pub async fn load_task_graph(qrs: &QrsClient) -> Result<TaskGraph> {
    let reload_tasks = qrs.list_reload_tasks(None).await?;
    let external_tasks = qrs.list_external_program_tasks(None).await?;
    let apps = qrs.list_apps().await?;
    let schema_events = qrs.list_schema_events().await?;
    let composite_events = qrs.list_composite_events().await?;
    Ok(TaskGraph::from_repository(
        reload_tasks,
        external_tasks,
        &apps,
        schema_events,
        composite_events,
    ))
}
