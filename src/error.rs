//! Semantic error types for ephemera.
//!
//! Conditions a caller might inspect, retry, or report are modelled as
//! semantic error enums (via `thiserror`). Opaque errors (`eyre::Report`) are
//! reserved for the binary boundary.
//!
//! The harness taxonomy lives in [`HarnessError`]. Teardown failures are a
//! separate [`TeardownError`] struct because the lifecycle guard attaches them
//! as a secondary fault next to a body error rather than replacing it.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Configuration could not be loaded or is unusable.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A configuration file was unreadable or not valid TOML.
    #[error("cannot load configuration file: {message}")]
    ParseError {
        /// Path and cause.
        message: String,
    },

    /// A value that has no default was left empty.
    #[error("{field} must be set")]
    MissingRequired {
        /// Dotted name of the field.
        field: String,
    },

    /// A value was present but rejected.
    #[error("invalid value for {field}: {reason}")]
    InvalidValue {
        /// Dotted field name or environment variable.
        field: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// Layer merging in `ortho_config` failed.
    #[error("cannot merge configuration layers: {0}")]
    OrthoConfig(Arc<ortho_config::OrthoError>),
}

/// The container engine is unreachable or unhealthy.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A client for the endpoint could not be built.
    #[error("cannot connect to the container engine: {message}")]
    ConnectionFailed {
        /// Cause reported by the client.
        message: String,
    },

    /// No socket exists at the configured path.
    #[error("no container engine socket at {path}")]
    SocketNotFound {
        /// Socket path that was tried.
        path: PathBuf,
    },

    /// The socket exists but this user may not open it.
    #[error("no permission to open container engine socket {path}")]
    PermissionDenied {
        /// Socket path that was tried.
        path: PathBuf,
    },

    /// A blocking wrapper could not build its tokio runtime.
    #[error("cannot build async runtime: {message}")]
    RuntimeCreationFailed {
        /// Cause reported by tokio.
        message: String,
    },

    /// The engine answered the ping with an error.
    #[error("container engine ping failed: {message}")]
    HealthCheckFailed {
        /// Cause reported by the engine.
        message: String,
    },

    /// The engine did not answer the ping in time.
    #[error("container engine did not answer within {seconds} seconds")]
    HealthCheckTimeout {
        /// Limit that elapsed.
        seconds: u64,
    },
}

/// Errors raised by the provisioning harness.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// The engine could not pull, create, start, or inspect the container.
    #[error("failed to provision '{image}': {message}")]
    ProvisioningFailed {
        /// The image being provisioned.
        image: String,
        /// A description of the provisioning failure.
        message: String,
    },

    /// The container started but never signalled readiness in time.
    #[error("container not ready after {elapsed:?}; last output: {}", .last_output.as_deref().unwrap_or("<none>"))]
    ReadinessTimeout {
        /// Time spent waiting before giving up.
        elapsed: Duration,
        /// The last complete line observed on the output stream, if any.
        last_output: Option<String>,
    },

    /// The container output stream ended before the readiness rule matched.
    #[error("container '{container_id}' exited before becoming ready; last output: {}", .last_output.as_deref().unwrap_or("<none>"))]
    ExitedBeforeReady {
        /// The container that stopped producing output.
        container_id: String,
        /// The last complete line observed on the output stream, if any.
        last_output: Option<String>,
    },

    /// The container output stream failed while waiting for readiness.
    #[error("failed to read output of container '{container_id}': {message}")]
    LogStreamFailed {
        /// The container whose output was being read.
        container_id: String,
        /// A description of the stream failure.
        message: String,
    },

    /// An endpoint was requested before the instance became ready.
    #[error("container '{container_id}' is not ready; endpoints are unavailable")]
    NotReady {
        /// The container that was queried too early.
        container_id: String,
    },

    /// The requested port was not listed in the `ProvisionSpec`.
    #[error("port {port} was not requested when the container was provisioned")]
    PortNotExposed {
        /// The requested internal port, e.g. `5432/tcp`.
        port: String,
    },
}

/// A container could not be removed; the resource may have leaked.
#[derive(Debug, Error)]
#[error("failed to remove container '{container_id}' after {attempts} attempts: {message}")]
pub struct TeardownError {
    /// The container that could not be removed.
    pub container_id: String,
    /// Number of removal attempts made.
    pub attempts: u32,
    /// A description of the last removal failure.
    pub message: String,
}

/// Errors raised by the connectivity probe and its connection boundary.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// A connection to the resolved endpoint could not be opened.
    #[error("failed to connect to {host}:{port}: {message}")]
    ConnectFailed {
        /// Host of the endpoint.
        host: String,
        /// External port of the endpoint.
        port: u16,
        /// A description of the connection failure.
        message: String,
    },

    /// The liveness round-trip failed on an open connection.
    #[error("connectivity check failed: {message}")]
    Connectivity {
        /// A description of the transport failure.
        message: String,
    },
}

/// Top-level error type for ephemera.
///
/// Aggregates the domain-specific errors into a single type. The binary
/// converts it to `eyre::Report` at its boundary.
#[derive(Debug, Error)]
pub enum EphemeraError {
    /// An error occurred during configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An error occurred while talking to the container engine.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// An error occurred in the provisioning harness.
    #[error(transparent)]
    Harness(#[from] HarnessError),

    /// A container could not be torn down.
    #[error(transparent)]
    Teardown(#[from] TeardownError),

    /// The connectivity probe failed.
    #[error(transparent)]
    Probe(#[from] ProbeError),
}

/// A specialised `Result` type for ephemera operations.
pub type Result<T> = std::result::Result<T, EphemeraError>;

#[cfg(test)]
mod tests {
    use super::*;
    use eyre::Report;
    use rstest::{fixture, rstest};

    #[fixture]
    fn container_id() -> String {
        String::from("abc123")
    }

    #[rstest]
    #[case(
        "image",
        "cannot be empty",
        "invalid value for image: cannot be empty"
    )]
    #[case(
        "postgres.startup_timeout_secs",
        "must be greater than zero",
        "invalid value for postgres.startup_timeout_secs: must be greater than zero"
    )]
    fn config_error_invalid_value_displays_correctly(
        #[case] field: &str,
        #[case] reason: &str,
        #[case] expected: &str,
    ) {
        let error = ConfigError::InvalidValue {
            field: String::from(field),
            reason: String::from(reason),
        };
        assert_eq!(error.to_string(), expected);
    }

    #[rstest]
    fn config_error_ortho_config_displays_correctly() {
        let ortho_error = ortho_config::OrthoError::Validation {
            key: String::from("postgres.image"),
            message: String::from("must not be empty"),
        };
        let error = ConfigError::OrthoConfig(Arc::new(ortho_error));
        assert_eq!(
            error.to_string(),
            "cannot merge configuration layers: Validation failed for 'postgres.image': must not be empty"
        );
    }

    #[rstest]
    fn engine_error_health_check_timeout_displays_correctly() {
        let error = EngineError::HealthCheckTimeout { seconds: 10 };
        assert_eq!(
            error.to_string(),
            "container engine did not answer within 10 seconds"
        );
    }

    #[rstest]
    fn readiness_timeout_includes_last_output() {
        let error = HarnessError::ReadinessTimeout {
            elapsed: Duration::from_millis(1500),
            last_output: Some(String::from("initdb: syncing data to disk")),
        };
        assert_eq!(
            error.to_string(),
            "container not ready after 1.5s; last output: initdb: syncing data to disk"
        );
    }

    #[rstest]
    fn readiness_timeout_without_output_says_none() {
        let error = HarnessError::ReadinessTimeout {
            elapsed: Duration::from_millis(1),
            last_output: None,
        };
        assert_eq!(
            error.to_string(),
            "container not ready after 1ms; last output: <none>"
        );
    }

    #[rstest]
    fn not_ready_names_container(container_id: String) {
        let error = HarnessError::NotReady { container_id };
        assert_eq!(
            error.to_string(),
            "container 'abc123' is not ready; endpoints are unavailable"
        );
    }

    #[rstest]
    fn teardown_error_reports_attempts(container_id: String) {
        let error = TeardownError {
            container_id,
            attempts: 2,
            message: String::from("engine unavailable"),
        };
        assert_eq!(
            error.to_string(),
            "failed to remove container 'abc123' after 2 attempts: engine unavailable"
        );
    }

    #[rstest]
    fn probe_error_connect_failed_displays_endpoint() {
        let error = ProbeError::ConnectFailed {
            host: String::from("localhost"),
            port: 49153,
            message: String::from("connection refused"),
        };
        assert_eq!(
            error.to_string(),
            "failed to connect to localhost:49153: connection refused"
        );
    }

    #[rstest]
    #[case(
        EphemeraError::from(ConfigError::MissingRequired {
            field: String::from("postgres.image"),
        }),
        "postgres.image must be set"
    )]
    #[case(
        EphemeraError::from(HarnessError::PortNotExposed {
            port: String::from("6379/tcp"),
        }),
        "port 6379/tcp was not requested when the container was provisioned"
    )]
    #[case(
        EphemeraError::from(ProbeError::Connectivity {
            message: String::from("connection closed"),
        }),
        "connectivity check failed: connection closed"
    )]
    fn eyre_report_preserves_error_messages(#[case] error: EphemeraError, #[case] expected: &str) {
        let report = Report::from(error);
        assert_eq!(report.to_string(), expected);
    }
}
