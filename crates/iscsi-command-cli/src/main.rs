#![deny(unsafe_code)]

//! iscsi-command: runs the sidecar server, or talks to one.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use iscsi_command_config::AppConfig;
use iscsi_command_core::ipc::ISCSI_LS;
use iscsi_command_core::{CommandRequest, CommandResponse, Daemon, IpcClient, LunInfo};

/// iSCSI LUN discovery sidecar.
#[derive(Debug, Parser)]
#[command(
    name = "iscsi-command",
    version = iscsi_command_core::build_info::LONG_VERSION,
    about,
    long_about = None
)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Increase log verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Serve discovery requests on the configured Unix socket.
    Serve,

    /// Send one discovery request to a running server.
    Execute(ExecuteArgs),

    /// Check that a server is answering.
    Ping,

    /// Validate and display configuration.
    Config {
        /// Show the resolved configuration.
        #[arg(long)]
        show: bool,
    },
}

#[derive(Debug, Args)]
struct ExecuteArgs {
    /// Target portal, `host[:port]`.
    #[arg(long)]
    portal: String,

    /// Initiator IQN presented to the target.
    #[arg(long)]
    initiator_name: String,

    /// IQN of the target whose LUNs to list.
    #[arg(long)]
    target_iqn: String,

    #[arg(long, default_value = "")]
    auth_login: String,

    #[arg(long, default_value = "", hide_default_value = true)]
    auth_password: String,

    /// Command to request. Anything but `iscsi-ls` is refused by the server.
    #[arg(long, default_value = ISCSI_LS)]
    command: String,

    /// Seconds the server may spend on the request.
    #[arg(long, default_value_t = 10)]
    timeout_secs: u64,

    /// Print the raw response as JSON.
    #[arg(long)]
    json: bool,
}

impl ExecuteArgs {
    fn to_request(&self) -> CommandRequest {
        let mut request =
            CommandRequest::iscsi_ls(&*self.portal, &*self.initiator_name, &*self.target_iqn)
                .with_credentials(&*self.auth_login, &*self.auth_password);
        request.command = self.command.clone();
        request
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config).await?;
    init_tracing(&config.log_level, cli.verbose);

    match cli.command {
        Commands::Serve => cmd_serve(config).await?,
        Commands::Execute(args) => cmd_execute(&config, &args).await?,
        Commands::Ping => cmd_ping(&config).await?,
        Commands::Config { show } => cmd_config(&cli.config, &config, show)?,
    }

    Ok(())
}

/// `RUST_LOG` wins; otherwise the configured level, raised by `-v`.
fn init_tracing(level: &str, verbose: u8) {
    let filter = match verbose {
        0 => level,
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();
}

async fn cmd_serve(config: AppConfig) -> Result<()> {
    info!(socket = %config.socket_path, "Starting iscsi-command server");
    let daemon = Daemon::new(config);
    daemon.run().await?;
    Ok(())
}

async fn cmd_execute(config: &AppConfig, args: &ExecuteArgs) -> Result<()> {
    let client = IpcClient::new(&config.socket_path);
    info!(socket = %config.socket_path, "Sending request to server");

    let response = client
        .execute(&args.to_request(), Duration::from_secs(args.timeout_secs))
        .await
        .context("Execute failed")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        print!("{}", render_response(&response));
    }

    if !response.error.is_empty() {
        warn!(error = %response.error, "Server returned an error");
        bail!("server returned an error: {}", response.error);
    }
    Ok(())
}

async fn cmd_ping(config: &AppConfig) -> Result<()> {
    let ping = IpcClient::new(&config.socket_path)
        .ping()
        .await
        .context("Ping failed")?;
    println!("{} ({})", ping.status, ping.version);
    Ok(())
}

fn cmd_config(config_path: &Path, config: &AppConfig, show: bool) -> Result<()> {
    if show {
        print!("{}", config.to_yaml()?);
    } else {
        println!("Configuration at '{}' is valid.", config_path.display());
    }
    Ok(())
}

async fn load_config(path: &Path) -> Result<AppConfig> {
    AppConfig::load(path)
        .await
        .with_context(|| format!("Failed to load config from {}", path.display()))
}

/// Raw tool output followed by a LUN table.
fn render_response(response: &CommandResponse) -> String {
    let mut out = String::new();
    if !response.output.is_empty() {
        let _ = writeln!(out, "{}", response.output.trim_end());
    }
    if !response.luns.is_empty() {
        let _ = writeln!(out);
        out.push_str(&render_luns(&response.luns));
    }
    out
}

fn render_luns(luns: &[LunInfo]) -> String {
    let headers = ["LUN", "SIZE", "VENDOR", "PRODUCT", "SERIAL"];
    let rows: Vec<[String; 5]> = luns
        .iter()
        .map(|lun| {
            [
                lun.lun_id.to_string(),
                lun.size.clone(),
                lun.vendor.clone(),
                lun.product.clone(),
                lun.serial.clone(),
            ]
        })
        .collect();

    let mut widths = headers.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    let mut out = String::new();
    let mut line = |cells: [&str; 5]| {
        let joined: Vec<String> = cells
            .iter()
            .zip(widths)
            .map(|(cell, width)| format!("{cell:<width$}"))
            .collect();
        let _ = writeln!(out, "{}", joined.join("  ").trim_end());
    };
    line(headers);
    for row in &rows {
        line(row.each_ref().map(String::as_str));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_execute_args() {
        let cli = Cli::try_parse_from([
            "iscsi-command",
            "-c",
            "/etc/iscsi-command/config.yaml",
            "execute",
            "--portal",
            "10.0.0.5:3260",
            "--initiator-name",
            "iqn.1993-08.org.debian",
            "--target-iqn",
            "iqn.2023-01.com.example",
            "--auth-login",
            "user",
            "--auth-password",
            "password",
        ])
        .unwrap();

        assert_eq!(cli.config, PathBuf::from("/etc/iscsi-command/config.yaml"));
        let Commands::Execute(args) = cli.command else {
            panic!("expected execute");
        };
        assert_eq!(args.command, "iscsi-ls");
        assert_eq!(args.timeout_secs, 10);

        let request = args.to_request();
        assert_eq!(request.portal, "10.0.0.5:3260");
        assert_eq!(request.target_iqn, "iqn.2023-01.com.example");
        assert!(request.has_credentials());
    }

    #[test]
    fn test_execute_requires_target() {
        let result = Cli::try_parse_from([
            "iscsi-command",
            "execute",
            "--portal",
            "p",
            "--initiator-name",
            "i",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_defaults_and_verbosity() {
        let cli = Cli::try_parse_from(["iscsi-command", "-vv", "serve"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("config.yaml"));
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Commands::Serve));
    }

    #[test]
    fn test_config_show_flag() {
        let cli = Cli::try_parse_from(["iscsi-command", "config", "--show"]).unwrap();
        assert!(matches!(cli.command, Commands::Config { show: true }));
    }

    #[test]
    fn test_render_luns_table() {
        let luns = vec![
            LunInfo {
                lun_id: 0,
                size: "10GB".to_string(),
                vendor: "ACME".to_string(),
                product: "DISK".to_string(),
                serial: "XYZ".to_string(),
            },
            LunInfo {
                lun_id: 12,
                size: "1TB".to_string(),
                vendor: "LIO-ORG".to_string(),
                product: "block0".to_string(),
                serial: "6001405abc".to_string(),
            },
        ];

        assert_eq!(
            render_luns(&luns),
            "LUN  SIZE  VENDOR   PRODUCT  SERIAL\n\
             0    10GB  ACME     DISK     XYZ\n\
             12   1TB   LIO-ORG  block0   6001405abc\n"
        );
    }

    #[test]
    fn test_render_soft_error_response_has_no_table() {
        let response = CommandResponse::soft_error("Unsupported command", "");
        assert_eq!(render_response(&response), "");
    }

    #[tokio::test]
    async fn test_missing_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(&dir.path().join("config.yaml"))
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("Failed to load config from "));
    }

    #[tokio::test]
    async fn test_config_without_socket_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "port: \"50051\"\n").unwrap();
        assert!(load_config(&path).await.is_err());
    }

    #[test_log::test(tokio::test)]
    async fn test_execute_against_running_server() {
        use iscsi_command_core::CommandTranslator;
        use iscsi_command_test_utils::config::TestConfigBuilder;
        use iscsi_command_test_utils::fixtures;
        use iscsi_command_test_utils::runner::ScriptedRunner;
        use iscsi_command_test_utils::server::TestServer;

        let server = TestServer::start(CommandTranslator::new(
            ScriptedRunner::succeeding(fixtures::SINGLE_LUN_OUTPUT),
            ISCSI_LS,
        ))
        .await;
        let config = TestConfigBuilder::new()
            .socket_path(&server.socket_path)
            .build();

        let args = ExecuteArgs {
            portal: fixtures::PORTAL.to_string(),
            initiator_name: fixtures::INITIATOR.to_string(),
            target_iqn: fixtures::TARGET_IQN.to_string(),
            auth_login: String::new(),
            auth_password: String::new(),
            command: ISCSI_LS.to_string(),
            timeout_secs: 5,
            json: false,
        };
        cmd_execute(&config, &args).await.unwrap();
        cmd_ping(&config).await.unwrap();

        let mut refused = args;
        refused.command = "rm".to_string();
        let err = cmd_execute(&config, &refused).await.unwrap_err();
        assert!(err.to_string().contains("Unsupported command"));

        server.shutdown().await.unwrap();
    }
}
