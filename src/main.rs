use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::Parser;

use editor_relay::api;
use editor_relay::paths;
use editor_relay::relay::Relay;
use editor_relay::settings::{self, SettingsOverrides};

#[derive(Parser)]
#[command(name = "editor-relay", about = "HTTP relay between agents and the editor host", version)]
struct Args {
    /// Config directory (settings.json, audit log, port file)
    #[arg(long, env = "EDITOR_RELAY_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    /// Editor host command endpoint
    #[arg(long)]
    host_url: Option<String>,

    /// Host call timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Maximum steps per pipeline
    #[arg(long)]
    max_steps: Option<usize>,

    /// API port (0 = OS-assigned)
    #[arg(long)]
    port: Option<u16>,

    /// Debug logging
    #[arg(long, short)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    editor_relay::logging::init(args.verbose);

    let config_dir = args.config_dir.unwrap_or_else(paths::default_config_dir);
    let overrides = SettingsOverrides {
        host_url: args.host_url,
        timeout_secs: args.timeout,
        max_pipeline_steps: args.max_steps,
        api_port: args.port,
    };
    let settings = match settings::resolve_settings(&config_dir, &overrides) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, config_dir = %config_dir.display(), "invalid settings");
            process::exit(2);
        }
    };

    let relay = Arc::new(Relay::from_settings(&settings, &config_dir));
    let port = match api::start_api_server(relay, settings.api_port).await {
        Ok(port) => port,
        Err(e) => {
            tracing::error!(error = %e, "failed to start API server");
            process::exit(1);
        }
    };

    // Port file in the config dir for external tool discovery
    let port_file = paths::port_file_path(&config_dir);
    if let Err(e) = std::fs::create_dir_all(&config_dir)
        .and_then(|()| std::fs::write(&port_file, port.to_string()))
    {
        tracing::warn!(path = %port_file.display(), error = %e, "could not write port file");
    }
    tracing::info!("relay listening on http://127.0.0.1:{port}");

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
    let _ = std::fs::remove_file(&port_file);
    tracing::info!("shutting down");
}
