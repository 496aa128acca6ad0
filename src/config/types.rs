//! Configuration data types for ephemera.

use std::time::Duration;

use ortho_config::{OrthoConfig, OrthoResult, PostMergeContext, PostMergeHook};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::harness::PullPolicy;

/// Default postgres image provisioned by `ephemera check`.
pub const DEFAULT_POSTGRES_IMAGE: &str = "docker.io/postgres:15.2-alpine";

/// Postgres instance configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct PostgresConfig {
    /// Image reference to provision.
    pub image: String,

    /// Superuser name passed as `POSTGRES_USER`.
    pub user: String,

    /// Superuser password passed as `POSTGRES_PASSWORD`.
    pub password: String,

    /// Database created at start-up, passed as `POSTGRES_DB`.
    pub database: String,

    /// Seconds allowed for the server to report readiness.
    pub startup_timeout_secs: u64,

    /// How many times the ready line must appear.
    ///
    /// The official image prints it once for the temporary initdb server and
    /// again for the real server, so the default is two.
    pub ready_occurrences: u64,

    /// When to pull the image.
    pub pull_policy: PullPolicy,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            image: String::from(DEFAULT_POSTGRES_IMAGE),
            user: String::from("postgres"),
            password: String::from("postgres"),
            database: String::from("postgres"),
            startup_timeout_secs: 60,
            ready_occurrences: 2,
            pull_policy: PullPolicy::Missing,
        }
    }
}

impl PostgresConfig {
    /// Startup timeout as a [`Duration`].
    #[must_use]
    pub const fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }
}

/// Root application configuration.
///
/// This structure is loaded from configuration files, environment variables,
/// and command-line arguments with layered precedence. The precedence order
/// (lowest to highest) is: defaults, configuration file, environment variables,
/// command-line arguments.
///
/// Configuration files are discovered in this order:
/// 1. Path specified via `EPHEMERA_CONFIG_PATH` environment variable
/// 2. `.ephemera.toml` in the current working directory
/// 3. `.ephemera.toml` in the home directory
/// 4. `~/.config/ephemera/config.toml` (XDG default)
#[derive(Debug, Clone, Default, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(
    prefix = "EPHEMERA",
    post_merge_hook,
    discovery(
        app_name = "ephemera",
        env_var = "EPHEMERA_CONFIG_PATH",
        config_file_name = "config.toml",
        dotfile_name = ".ephemera.toml",
        config_cli_long = "config",
        config_cli_visible = true,
    )
)]
pub struct AppConfig {
    /// The container engine socket path or URL.
    pub engine_socket: Option<String>,

    /// Host reported on resolved endpoints. Derived from the engine socket
    /// when unset.
    pub host: Option<String>,

    /// Postgres instance configuration.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub postgres: PostgresConfig,
}

impl AppConfig {
    /// Check values that deserialise cleanly but cannot be provisioned.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for a blank image, a zero startup
    /// timeout, or a zero occurrence count.
    pub fn validate(&self) -> crate::error::Result<()> {
        let invalid = |field: &str, reason: &str| -> crate::error::Result<()> {
            Err(ConfigError::InvalidValue {
                field: String::from(field),
                reason: String::from(reason),
            }
            .into())
        };

        if self.postgres.image.trim().is_empty() {
            return invalid("postgres.image", "cannot be empty");
        }
        if self.postgres.startup_timeout_secs == 0 {
            return invalid("postgres.startup_timeout_secs", "must be greater than zero");
        }
        if self.postgres.ready_occurrences == 0 {
            return invalid("postgres.ready_occurrences", "must be greater than zero");
        }
        Ok(())
    }
}

impl PostMergeHook for AppConfig {
    fn post_merge(&mut self, _ctx: &PostMergeContext) -> OrthoResult<()> {
        // Blank strings from env or CLI mean "unset".
        self.engine_socket = self
            .engine_socket
            .take()
            .filter(|socket| !socket.trim().is_empty());
        self.host = self.host.take().filter(|host| !host.trim().is_empty());
        Ok(())
    }
}
