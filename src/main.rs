//! dcc-bridge CLI entry point
//!
//! `dccb` runs the gateway (foreground or daemonized), runs a standalone
//! demo host, sends one-shot commands to a backend, and manages the
//! configuration file.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use fork::{daemon, Fork};
use tokio::runtime::Runtime;
use tokio::signal;
use tokio::signal::unix::{signal as unix_signal, SignalKind};
use tracing::{error, info, warn};

use dcc_bridge::config::{loader, Config};
use dcc_bridge::dispatch::{DispatcherBuilder, EngineLoop, EngineQueue};
use dcc_bridge::gateway::{router, GatewayState};
use dcc_bridge::protocol::CommandParams;
use dcc_bridge::server::SocketServer;
use dcc_bridge::{logging, SocketClient};

/// dcc-bridge control-plane CLI
#[derive(Parser)]
#[command(name = "dccb")]
#[command(version, about = "Remote-control bridge for single-threaded DCC and CAD hosts")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands for the dccb CLI
#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP/WebSocket gateway
    Gateway {
        /// Configuration file path
        #[arg(long)]
        config: Option<PathBuf>,

        /// Listen address (overrides the config file)
        #[arg(long)]
        host: Option<String>,

        /// Listen port (overrides the config file)
        #[arg(long)]
        port: Option<u16>,

        /// Stay attached to the terminal instead of daemonizing
        #[arg(long)]
        foreground: bool,
    },

    /// Run a standalone demo host (socket server plus engine loop)
    Host {
        /// Backend name from the config whose endpoint to bind
        #[arg(long, default_value = "modeler")]
        backend: String,

        /// Configuration file path
        #[arg(long)]
        config: Option<PathBuf>,

        /// Bind address (overrides the config file)
        #[arg(long)]
        host: Option<String>,

        /// Bind port (overrides the config file)
        #[arg(long)]
        port: Option<u16>,

        /// Run handlers inline instead of through the engine tick loop
        #[arg(long)]
        headless: bool,
    },

    /// Send a single command to a backend and print the response
    Call {
        /// Backend name from the config
        backend: String,

        /// Method name to invoke
        method: String,

        /// Parameters as a JSON object
        #[arg(long, default_value = "{}")]
        params: String,

        /// Configuration file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Actions for the `config` subcommand
#[derive(Subcommand)]
enum ConfigAction {
    /// Write the default configuration file
    Init {
        /// Overwrite an existing configuration file
        #[arg(long)]
        force: bool,
    },
    /// Print which configuration file would be loaded
    Path,
    /// Print the effective configuration as TOML
    Show,
}

fn main() -> ExitCode {
    // Parse CLI arguments BEFORE any fork/runtime operations
    // This ensures errors are shown to the user in the terminal
    let cli = Cli::parse();

    match cli.command {
        Commands::Gateway {
            config,
            host,
            port,
            foreground,
        } => run_gateway(config.as_deref(), host, port, foreground),
        Commands::Host {
            backend,
            config,
            host,
            port,
            headless,
        } => run_host(&backend, config.as_deref(), host, port, headless),
        Commands::Call {
            backend,
            method,
            params,
            config,
        } => run_call(&backend, &method, &params, config.as_deref()),
        Commands::Config { action } => run_config(action),
    }
}

/// Load and validate configuration, reporting failures on stderr.
fn load_config(path: Option<&Path>) -> Result<Config, ExitCode> {
    match loader::load(path) {
        Ok((config, _source)) => Ok(config),
        Err(e) => {
            eprintln!("error: {}", e);
            Err(ExitCode::from(2))
        }
    }
}

/// Wait for SIGINT or SIGTERM.
async fn wait_for_shutdown() {
    match unix_signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = signal::ctrl_c() => {
                    info!("received SIGINT, shutting down");
                },
                _ = sigterm.recv() => {
                    info!("received SIGTERM, shutting down");
                },
            }
        }
        Err(e) => {
            warn!("could not register SIGTERM handler ({}), using SIGINT only", e);
            if signal::ctrl_c().await.is_ok() {
                info!("received SIGINT, shutting down");
            }
        }
    }
}

/// Fork and detach from the terminal.
///
/// Must run BEFORE the Tokio runtime starts: forking after runtime
/// initialization leaves worker threads behind in the child.
fn daemonize_process() -> Result<(), ExitCode> {
    match daemon(false, false) {
        Ok(Fork::Child) => Ok(()),
        Ok(Fork::Parent(_)) => std::process::exit(0),
        Err(e) => {
            eprintln!("error: failed to daemonize: {}", e);
            Err(ExitCode::FAILURE)
        }
    }
}

fn run_gateway(
    config_path: Option<&Path>,
    host: Option<String>,
    port: Option<u16>,
    foreground: bool,
) -> ExitCode {
    let mut config = match load_config(config_path) {
        Ok(config) => config,
        Err(code) => return code,
    };
    if let Some(host) = host {
        config.gateway.host = host;
    }
    if let Some(port) = port {
        config.gateway.port = port;
    }

    if !foreground {
        if let Err(code) = daemonize_process() {
            return code;
        }
    }

    // Initialize logging after the fork so the subscriber binds to the
    // surviving process's stderr.
    logging::init(&config.log.level);

    let runtime = match Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("failed to create Tokio runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let result: Result<(), Box<dyn std::error::Error>> = runtime.block_on(async {
        let state = GatewayState::from_config(&config)?;
        let app = router(state);
        let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        info!(
            "gateway listening on {} ({} backends)",
            addr,
            config.backends.len()
        );
        axum::serve(listener, app)
            .with_graceful_shutdown(wait_for_shutdown())
            .await?;
        Ok(())
    });

    match result {
        Ok(()) => {
            info!("gateway stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("gateway failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_host(
    backend: &str,
    config_path: Option<&Path>,
    host: Option<String>,
    port: Option<u16>,
    headless: bool,
) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(code) => return code,
    };
    logging::init(&config.log.level);

    let endpoint = config.backends.get(backend);
    let bind_host = host
        .or_else(|| endpoint.map(|b| b.host.clone()))
        .unwrap_or_else(|| "127.0.0.1".to_string());
    let bind_port = port.or_else(|| endpoint.map(|b| b.port)).unwrap_or(9876);

    let (wait_timeout, tick_interval) = match (config.wait_timeout(), config.tick_interval()) {
        (Ok(wait), Ok(tick)) => (wait, tick),
        (Err(e), _) | (_, Err(e)) => {
            eprintln!("error: {}", e);
            return ExitCode::from(2);
        }
    };

    let builder = DispatcherBuilder::new()
        .with_builtins(backend)
        .wait_timeout(wait_timeout);

    let (dispatcher, engine_loop) = if headless {
        info!("starting host '{}' in headless mode", backend);
        (builder.build_headless(), None)
    } else {
        let queue = Arc::new(EngineQueue::new());
        let dispatcher = builder.build_engine(Arc::clone(&queue));
        let engine_loop = EngineLoop::spawn(queue, tick_interval);
        (dispatcher, Some(engine_loop))
    };

    let server_config = match config.server_config(&bind_host, bind_port) {
        Ok(server_config) => server_config,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::from(2);
        }
    };
    let server = match SocketServer::bind(server_config, dispatcher) {
        Ok(server) => server,
        Err(e) => {
            error!("failed to bind {}:{}: {}", bind_host, bind_port, e);
            return ExitCode::FAILURE;
        }
    };
    let handle = server.start();
    info!("host '{}' serving on {}", backend, handle.local_addr());

    let runtime = match Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("failed to create Tokio runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };
    runtime.block_on(wait_for_shutdown());

    handle.shutdown();
    if let Some(engine_loop) = engine_loop {
        engine_loop.shutdown();
    }
    info!("host stopped");
    ExitCode::SUCCESS
}

fn run_call(backend: &str, method: &str, params: &str, config_path: Option<&Path>) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(code) => return code,
    };

    let Some(endpoint) = config.backends.get(backend) else {
        eprintln!(
            "error: unknown backend '{}' (configured: {})",
            backend,
            config.backends.keys().cloned().collect::<Vec<_>>().join(", ")
        );
        return ExitCode::from(2);
    };

    let params: CommandParams = match serde_json::from_str::<serde_json::Value>(params) {
        Ok(serde_json::Value::Object(map)) => map,
        Ok(_) => {
            eprintln!("error: --params must be a JSON object");
            return ExitCode::from(2);
        }
        Err(e) => {
            eprintln!("error: --params is not valid JSON: {}", e);
            return ExitCode::from(2);
        }
    };

    let client_config = match config.client_config(endpoint) {
        Ok(client_config) => client_config,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::from(2);
        }
    };

    let runtime = match Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("error: failed to create Tokio runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let envelope = runtime.block_on(async {
        let client = SocketClient::new(client_config);
        let envelope = client.send_command(method, params).await;
        client.disconnect().await;
        envelope
    });

    match serde_json::to_string_pretty(&envelope.to_value()) {
        Ok(text) => println!("{}", text),
        Err(e) => {
            eprintln!("error: failed to render response: {}", e);
            return ExitCode::FAILURE;
        }
    }
    if envelope.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn run_config(action: ConfigAction) -> ExitCode {
    match action {
        ConfigAction::Init { force } => {
            let path = loader::default_path();
            match loader::write_default(&path, force) {
                Ok(()) => {
                    println!("wrote {}", path.display());
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    eprintln!("error: {}", e);
                    ExitCode::FAILURE
                }
            }
        }
        ConfigAction::Path => match loader::load(None) {
            Ok((_config, source)) => {
                match source.path() {
                    Some(path) => println!("{}", path.display()),
                    None => println!("(built-in defaults; no configuration file found)"),
                }
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("error: {}", e);
                ExitCode::from(2)
            }
        },
        ConfigAction::Show => match loader::load(None) {
            Ok((config, _source)) => match toml::to_string_pretty(&config) {
                Ok(toml) => {
                    print!("{}", toml);
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    eprintln!("error: {}", e);
                    ExitCode::FAILURE
                }
            },
            Err(e) => {
                eprintln!("error: {}", e);
                ExitCode::from(2)
            }
        },
    }
}
