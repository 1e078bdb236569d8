mod tools;
mod version;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use rust_mcp_sdk::schema::{
    Implementation, InitializeResult, ProtocolVersion, ServerCapabilities, ServerCapabilitiesTools,
};
use rust_mcp_sdk::{
    mcp_icon,
    mcp_server::{server_runtime, McpServerOptions},
    McpServer, StdioTransport, ToMcpServerHandler, TransportOptions,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

use azdo_core::config::{load_config, AzdoConfig, Settings};
use azdo_core::runner::AzCli;

use crate::tools::{AzdoServerHandler, McpContext};

#[derive(Parser)]
#[command(name = "azdo-mcp", version = version::FULL)]
struct Args {
    /// Config file to use instead of the global and project files.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Default organisation URL, e.g. https://dev.azure.com/contoso.
    #[arg(long)]
    org_url: Option<String>,
    /// Default project name.
    #[arg(long)]
    project: Option<String>,
    /// Default team used to resolve the current sprint.
    #[arg(long)]
    team: Option<String>,
    /// Command line used to invoke the Azure CLI.
    #[arg(long)]
    az_command: Option<String>,
    /// Seconds before an `az` invocation is killed.
    #[arg(long)]
    timeout_secs: Option<u64>,
    /// Log filter (overrides RUST_LOG). Logs go to stderr.
    #[arg(long)]
    log_level: Option<String>,
}

impl Args {
    fn overrides(&self) -> AzdoConfig {
        AzdoConfig {
            org_url: self.org_url.clone(),
            project: self.project.clone(),
            default_team: self.team.clone(),
            az_command: self.az_command.clone(),
            timeout_secs: self.timeout_secs,
        }
    }
}

fn init_logging(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    // stdout is the JSON-RPC channel.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_settings(args: &Args) -> Result<Settings> {
    let env: HashMap<String, String> = std::env::vars().collect();
    let cwd = std::env::current_dir().context("resolve working directory")?;
    let config = load_config(args.config.as_deref(), &cwd, &env).context("load configuration")?;
    Settings::from_config(config.merge(args.overrides())).context("resolve settings")
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_level.as_deref());

    let settings = load_settings(&args)?;
    let runner = AzCli::new(settings.az_command.clone(), settings.timeout)
        .context("configure az command")?;
    info!(
        org_url = settings.org_url.as_deref().unwrap_or("-"),
        project = settings.project.as_deref().unwrap_or("-"),
        team = settings.default_team.as_deref().unwrap_or("-"),
        timeout_secs = runner.timeout().as_secs(),
        "starting azdo-mcp"
    );

    let server_details = InitializeResult {
        server_info: Implementation {
            name: "azdo-mcp".into(),
            version: version::FULL.into(),
            title: Some("Azure DevOps Boards MCP Server".into()),
            description: Some(
                "Read and update Azure DevOps work items through the az CLI, with confirmation and ownership checks".into(),
            ),
            icons: vec![mcp_icon!(
                src = "https://raw.githubusercontent.com/rust-mcp-stack/rust-mcp-sdk/main/assets/rust-mcp-icon.png",
                mime_type = "image/png",
                sizes = ["128x128"],
                theme = "dark"
            )],
            website_url: None,
        },
        capabilities: ServerCapabilities {
            tools: Some(ServerCapabilitiesTools { list_changed: None }),
            ..Default::default()
        },
        meta: None,
        instructions: Some(
            "Mutating tools need confirm=true. Updates are refused when the work item is assigned to someone else.".into(),
        ),
        protocol_version: ProtocolVersion::V2025_11_25.into(),
    };

    let transport = StdioTransport::new(TransportOptions::default())
        .map_err(|err| anyhow!("open stdio transport: {err}"))?;
    let handler = AzdoServerHandler {
        context: McpContext {
            runner: Arc::new(runner),
            settings: Arc::new(settings),
        },
    };

    let server = server_runtime::create_server(McpServerOptions {
        server_details,
        transport,
        handler: handler.to_mcp_server_handler(),
        task_store: None,
        client_task_store: None,
    });

    server
        .start()
        .await
        .map_err(|err| anyhow!("mcp server stopped: {err}"))
}
