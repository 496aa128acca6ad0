//! Liveness checks against a connected engine.

use std::time::Duration;

use bollard::Docker;
use tracing::debug;

use super::{EngineConnector, HEALTH_CHECK_TIMEOUT_SECS};
use crate::error::{EngineError, EphemeraError};

impl EngineConnector {
    /// Ping the engine once, giving up after the health check timeout.
    ///
    /// A successful ping means the API answers, not merely that the socket
    /// accepts connections.
    ///
    /// # Errors
    ///
    /// `EngineError::HealthCheckTimeout` when no answer arrives in time,
    /// `EngineError::HealthCheckFailed` when the engine answers with an
    /// error.
    pub async fn health_check_async(docker: &Docker) -> Result<(), EphemeraError> {
        let limit = Duration::from_secs(HEALTH_CHECK_TIMEOUT_SECS);
        let Ok(answer) = tokio::time::timeout(limit, docker.ping()).await else {
            return Err(EngineError::HealthCheckTimeout {
                seconds: HEALTH_CHECK_TIMEOUT_SECS,
            }
            .into());
        };

        answer.map_err(|error| EngineError::HealthCheckFailed {
            message: error.to_string(),
        })?;
        debug!("engine answered ping");
        Ok(())
    }

    /// Blocking form of [`Self::health_check_async`] on a private runtime.
    ///
    /// Must not be called from inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// `EngineError::RuntimeCreationFailed` when the runtime cannot be
    /// built, otherwise as [`Self::health_check_async`].
    pub fn health_check(docker: &Docker) -> Result<(), EphemeraError> {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|error| EngineError::RuntimeCreationFailed {
                message: error.to_string(),
            })?
            .block_on(Self::health_check_async(docker))
    }

    /// [`Self::connect`] followed by [`Self::health_check_async`].
    ///
    /// # Errors
    ///
    /// Any error of either step.
    pub async fn connect_and_verify_async(socket: &str) -> Result<Docker, EphemeraError> {
        let docker = Self::connect(socket)?;
        Self::health_check_async(&docker).await?;
        Ok(docker)
    }
}
