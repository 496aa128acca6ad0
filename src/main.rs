//! `ephemera` command-line entry point.
//!
//! Uses `eyre` for opaque error handling at the application boundary,
//! converting domain-specific errors into human-readable reports.
//!
//! Configuration is loaded with layered precedence via `OrthoConfig`:
//! 1. Application defaults
//! 2. Configuration file (`~/.config/ephemera/config.toml` or path from `EPHEMERA_CONFIG_PATH`)
//! 3. Environment variables (`EPHEMERA_*`)
//! 4. Command-line arguments

use std::sync::Arc;

use clap::Parser;
use ephemera::config::{AppConfig, CheckArgs, Cli, Commands, load_config};
use ephemera::engine::{EngineConnector, SocketResolver};
use ephemera::error::{EngineError, EphemeraError, Result as EphemeraResult};
use ephemera::harness::{Provisioner, ScopeError};
use ephemera::probe::{POSTGRES_PORT, PostgresRepository, Repository, postgres_spec};
use eyre::{Report, Result as EyreResult};
use mockable::DefaultEnv;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Application entry point.
///
/// Installs the log subscriber, loads configuration, then dispatches to the
/// subcommand handler on a fresh tokio runtime.
fn main() -> EyreResult<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = load_config(&cli).map_err(Report::from)?;

    let runtime = tokio::runtime::Runtime::new().map_err(|e| {
        Report::from(EphemeraError::from(EngineError::RuntimeCreationFailed {
            message: e.to_string(),
        }))
    })?;
    runtime.block_on(run(&cli, &config)).map_err(Report::from)
}

/// Log to stderr, filtered by `RUST_LOG` and defaulting to `info`.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Execute the CLI command, returning domain-specific errors.
async fn run(cli: &Cli, config: &AppConfig) -> EphemeraResult<()> {
    match &cli.command {
        Commands::Check(args) => run_check(config, args).await,
        Commands::Engine => check_engine(config).await,
    }
}

fn resolve_socket(config: &AppConfig) -> String {
    let env = DefaultEnv::new();
    let resolver = SocketResolver::new(&env);
    EngineConnector::resolve_socket(config.engine_socket.as_deref(), &resolver)
}

/// Verify the container engine responds.
#[expect(clippy::print_stdout, reason = "CLI output is the intended behaviour")]
async fn check_engine(config: &AppConfig) -> EphemeraResult<()> {
    let socket = resolve_socket(config);
    EngineConnector::connect_and_verify_async(&socket).await?;
    println!("Container engine at {socket} is responding.");
    Ok(())
}

/// Provision postgres, ping it once, and tear it down.
#[expect(clippy::print_stdout, reason = "CLI output is the intended behaviour")]
async fn run_check(config: &AppConfig, args: &CheckArgs) -> EphemeraResult<()> {
    let mut postgres = config.postgres.clone();
    if let Some(ref image) = args.image {
        postgres.image.clone_from(image);
    }
    if let Some(seconds) = args.timeout_secs {
        postgres.startup_timeout_secs = seconds;
    }
    let spec = postgres_spec(&postgres)?;

    let socket = resolve_socket(config);
    let docker = EngineConnector::connect_and_verify_async(&socket).await?;
    let host = config
        .host
        .clone()
        .unwrap_or_else(|| EngineConnector::published_host(&socket));
    let provisioner = Provisioner::new(Arc::new(docker)).with_host(host);

    info!(image = spec.image(), "provisioning postgres");
    let endpoint = provisioner
        .with_instance(&spec, async |instance| {
            let target = instance.connection_target(POSTGRES_PORT)?;
            let repository = PostgresRepository::connect(&target).await?;
            repository.ping().await?;
            Ok::<_, EphemeraError>(target.endpoint)
        })
        .await
        .map_err(flatten_scope_error)?;

    println!("postgres at {endpoint} answered the ping; container removed.");
    Ok(())
}

/// Surface the primary failure of a scoped run. A teardown failure attached
/// to a body error has already been logged by the guard.
fn flatten_scope_error(error: ScopeError<EphemeraError>) -> EphemeraError {
    match error {
        ScopeError::Provision(provision) => provision.into(),
        ScopeError::Body { source, .. } => source,
        ScopeError::Teardown(teardown) => teardown.into(),
    }
}
