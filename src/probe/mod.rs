//! Connectivity probe against a provisioned service.
//!
//! [`Repository::ping`] performs exactly one liveness round-trip over an
//! already-open connection. It does not retry or reconnect; callers own any
//! retry policy.

use std::future::Future;
use std::pin::Pin;

use tokio_postgres::{Client, NoTls};
use tracing::{debug, warn};

use crate::config::PostgresConfig;
use crate::error::{EphemeraError, ProbeError};
use crate::harness::{ConnectionTarget, ContainerPort, Credentials, ProvisionSpec, ReadinessRule};

/// Internal port the postgres server listens on.
pub const POSTGRES_PORT: ContainerPort = ContainerPort::tcp(5432);

/// Line the postgres server logs once it accepts connections.
pub const POSTGRES_READY_LINE: &str = "database system is ready to accept connections";

/// Boxed future returned by [`Repository::ping`].
pub type ProbeFuture<'a> = Pin<Box<dyn Future<Output = Result<(), ProbeError>> + Send + 'a>>;

/// A connection handle that can prove the service is alive.
pub trait Repository {
    /// Perform one liveness round-trip.
    fn ping(&self) -> ProbeFuture<'_>;
}

/// [`Repository`] backed by a `tokio-postgres` client.
pub struct PostgresRepository {
    client: Client,
}

impl PostgresRepository {
    /// Wrap an open client.
    #[must_use]
    pub const fn new(client: Client) -> Self {
        Self { client }
    }

    /// Open a connection to `target` and wrap it.
    ///
    /// # Errors
    ///
    /// Returns `ProbeError::ConnectFailed` when the connection cannot be
    /// established.
    pub async fn connect(target: &ConnectionTarget) -> Result<Self, ProbeError> {
        connect(target).await.map(Self::new)
    }
}

impl Repository for PostgresRepository {
    fn ping(&self) -> ProbeFuture<'_> {
        Box::pin(async move {
            self.client
                .batch_execute("SELECT 1")
                .await
                .map_err(|error| ProbeError::Connectivity {
                    message: error.to_string(),
                })
        })
    }
}

/// Open a postgres connection to `target` without TLS.
///
/// The connection task is spawned on the current tokio runtime and ends when
/// the returned client is dropped.
///
/// # Errors
///
/// Returns `ProbeError::ConnectFailed` when the connection cannot be
/// established.
pub async fn connect(target: &ConnectionTarget) -> Result<Client, ProbeError> {
    let (client, connection) = tokio_postgres::connect(&target.postgres_dsn(), NoTls)
        .await
        .map_err(|error| ProbeError::ConnectFailed {
            host: target.endpoint.host.clone(),
            port: target.endpoint.port,
            message: error.to_string(),
        })?;

    debug!(endpoint = %target.endpoint, "postgres connection established");
    drop(tokio::spawn(async move {
        if let Err(error) = connection.await {
            warn!(%error, "postgres connection closed with error");
        }
    }));

    Ok(client)
}

/// Provisioning spec for a postgres server described by `config`.
///
/// # Errors
///
/// Returns `ConfigError::MissingRequired` when the configured image is blank.
pub fn postgres_spec(config: &PostgresConfig) -> Result<ProvisionSpec, EphemeraError> {
    let occurrences = usize::try_from(config.ready_occurrences).unwrap_or(usize::MAX);
    let readiness = ReadinessRule::log_contains(POSTGRES_READY_LINE).with_occurrences(occurrences);

    Ok(ProvisionSpec::new(config.image.as_str(), readiness)?
        .with_port(POSTGRES_PORT)
        .with_env("POSTGRES_USER", config.user.as_str())
        .with_env("POSTGRES_PASSWORD", config.password.as_str())
        .with_env("POSTGRES_DB", config.database.as_str())
        .with_startup_timeout(config.startup_timeout())
        .with_pull_policy(config.pull_policy)
        .with_credentials(Credentials {
            user: config.user.clone(),
            password: config.password.clone(),
            database: config.database.clone(),
        }))
}
