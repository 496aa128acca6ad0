//! Configuration system for ephemera.
//!
//! Configuration is merged with `ortho_config`. Precedence, lowest to highest:
//! defaults, configuration file, environment variables, CLI flags.
//!
//! The configuration file is expected at `~/.config/ephemera/config.toml` by
//! default.
//!
//! # Example Configuration
//!
//! ```toml
//! engine_socket = "unix:///run/user/1000/podman/podman.sock"
//!
//! [postgres]
//! image = "docker.io/postgres:15.2-alpine"
//! user = "postgres"
//! password = "postgres"
//! database = "app"
//! startup_timeout_secs = 30
//! ready_occurrences = 2
//! pull_policy = "missing"
//! ```

mod cli;
mod loader;
mod types;


pub use cli::{CheckArgs, Cli, Commands};
pub use loader::{env_var_names, load_config};
pub use types::{AppConfig, DEFAULT_POSTGRES_IMAGE, PostgresConfig};
