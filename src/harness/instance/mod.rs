//! A provisioned container and its one-way lifecycle.
//!
//! A [`RunningInstance`] starts out *not ready*, becomes *ready* once the
//! readiness rule is satisfied (its port mappings are fixed at that moment),
//! and ends *terminated*. Transitions never go backwards. An instance dropped
//! before termination schedules a best-effort removal on the current tokio
//! runtime so cancelled or panicking callers do not leak containers.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bollard::models::{ContainerInspectResponse, PortBinding};
use tracing::{debug, error, info, warn};

use super::readiness;
use super::spec::{ContainerPort, Credentials, ProvisionSpec};
use crate::engine::{ContainerRuntime, is_not_found};
use crate::error::{HarnessError, TeardownError};

/// Delay before the single teardown retry.
const TEARDOWN_RETRY_DELAY: Duration = Duration::from_millis(200);

const TEARDOWN_ATTEMPTS: u32 = 2;

/// Observable lifecycle state of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    /// Started but not yet ready; endpoints are unavailable.
    NotReady,
    /// Ready; port mappings are fixed.
    Ready,
    /// Removed, or removal has been attempted.
    Terminated,
}

#[derive(Debug)]
enum Lifecycle {
    Starting,
    Ready { ports: BTreeMap<ContainerPort, u16> },
    Terminated,
}

/// Host-visible address of a container port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Host name or address clients connect to.
    pub host: String,
    /// Engine-assigned external port.
    pub port: u16,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Everything a client needs to reach the provisioned service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionTarget {
    /// Resolved endpoint.
    pub endpoint: Endpoint,
    /// Credentials taken from the `ProvisionSpec`.
    pub credentials: Credentials,
}

impl ConnectionTarget {
    /// Key/value connection string for a postgres client, TLS disabled.
    #[must_use]
    pub fn postgres_dsn(&self) -> String {
        format!(
            "host={} port={} user={} password={} dbname={} sslmode=disable",
            self.endpoint.host,
            self.endpoint.port,
            quote_dsn_value(&self.credentials.user),
            quote_dsn_value(&self.credentials.password),
            quote_dsn_value(&self.credentials.database),
        )
    }
}

/// Quote a key/value connection string value when it is empty or contains
/// spaces, quotes, or backslashes.
fn quote_dsn_value(value: &str) -> String {
    let needs_quotes =
        value.is_empty() || value.chars().any(|ch| ch.is_whitespace() || ch == '\'' || ch == '\\');
    if !needs_quotes {
        return String::from(value);
    }
    let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{escaped}'")
}

/// A container created by the provisioner.
pub struct RunningInstance<R: ContainerRuntime> {
    runtime: Arc<R>,
    container_id: String,
    host: String,
    spec: ProvisionSpec,
    lifecycle: Lifecycle,
    removal_settled: bool,
}

impl<R: ContainerRuntime> fmt::Debug for RunningInstance<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunningInstance")
            .field("container_id", &self.container_id)
            .field("host", &self.host)
            .field("image", &self.spec.image())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl<R: ContainerRuntime> RunningInstance<R> {
    pub(crate) const fn new(
        runtime: Arc<R>,
        container_id: String,
        host: String,
        spec: ProvisionSpec,
    ) -> Self {
        Self {
            runtime,
            container_id,
            host,
            spec,
            lifecycle: Lifecycle::Starting,
            removal_settled: false,
        }
    }

    /// Engine identifier of the container.
    #[must_use]
    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    /// The `ProvisionSpec` this instance was created from.
    #[must_use]
    pub const fn spec(&self) -> &ProvisionSpec {
        &self.spec
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> InstanceState {
        match self.lifecycle {
            Lifecycle::Starting => InstanceState::NotReady,
            Lifecycle::Ready { .. } => InstanceState::Ready,
            Lifecycle::Terminated => InstanceState::Terminated,
        }
    }

    /// Block until the readiness rule is satisfied, then fix port mappings.
    ///
    /// Calling this on an instance that is already ready returns immediately.
    ///
    /// # Errors
    ///
    /// Returns the readiness failure (`ReadinessTimeout`, `ExitedBeforeReady`,
    /// `LogStreamFailed`), `ProvisioningFailed` when the container cannot be
    /// inspected or lacks a host binding for a requested port, and `NotReady`
    /// when the instance has already been terminated.
    pub async fn await_ready(&mut self) -> Result<(), HarnessError> {
        match self.lifecycle {
            Lifecycle::Ready { .. } => return Ok(()),
            Lifecycle::Terminated => {
                return Err(HarnessError::NotReady {
                    container_id: self.container_id.clone(),
                });
            }
            Lifecycle::Starting => {}
        }

        let logs = self.runtime.container_logs(&self.container_id);
        readiness::await_ready(
            logs,
            self.spec.readiness(),
            self.spec.startup_timeout(),
            &self.container_id,
        )
        .await?;

        let inspected = self
            .runtime
            .inspect_container(&self.container_id)
            .await
            .map_err(|error| HarnessError::ProvisioningFailed {
                image: String::from(self.spec.image()),
                message: format!("failed to inspect container: {error}"),
            })?;
        let ports = published_ports(&self.spec, &inspected)?;

        info!(
            container_id = %self.container_id,
            image = self.spec.image(),
            ports = ?ports,
            "container ready"
        );
        self.lifecycle = Lifecycle::Ready { ports };
        Ok(())
    }

    /// Resolve the host-visible endpoint for an internal port.
    ///
    /// # Errors
    ///
    /// Returns `NotReady` before the instance is ready (or after termination)
    /// and `PortNotExposed` when `port` was not requested by the `ProvisionSpec`.
    pub fn resolve(&self, port: impl Into<ContainerPort>) -> Result<Endpoint, HarnessError> {
        let requested = port.into();
        let Lifecycle::Ready { ref ports } = self.lifecycle else {
            return Err(HarnessError::NotReady {
                container_id: self.container_id.clone(),
            });
        };

        ports
            .get(&requested)
            .map(|external| Endpoint {
                host: self.host.clone(),
                port: *external,
            })
            .ok_or_else(|| HarnessError::PortNotExposed {
                port: requested.to_string(),
            })
    }

    /// Resolve `port` and pair it with the `ProvisionSpec` credentials.
    ///
    /// # Errors
    ///
    /// Same as [`RunningInstance::resolve`].
    pub fn connection_target(
        &self,
        port: impl Into<ContainerPort>,
    ) -> Result<ConnectionTarget, HarnessError> {
        let endpoint = self.resolve(port)?;
        Ok(ConnectionTarget {
            endpoint,
            credentials: self.spec.credentials().clone(),
        })
    }

    /// Remove the container, retrying once on a transient engine error.
    ///
    /// The instance is terminated even when removal fails; the error reports
    /// a possibly leaked container. If this future is dropped before removal
    /// settles, `Drop` schedules the removal instead.
    ///
    /// # Errors
    ///
    /// Returns `TeardownError` when both removal attempts fail.
    pub async fn terminate(mut self) -> Result<(), TeardownError> {
        self.lifecycle = Lifecycle::Terminated;
        let outcome = remove_with_retry(self.runtime.as_ref(), &self.container_id).await;
        self.removal_settled = true;
        outcome
    }
}

impl<R: ContainerRuntime> Drop for RunningInstance<R> {
    fn drop(&mut self) {
        if self.removal_settled {
            return;
        }
        self.lifecycle = Lifecycle::Terminated;
        self.removal_settled = true;

        let container_id = self.container_id.clone();
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            error!(
                container_id = %container_id,
                "instance dropped outside a tokio runtime; container may be leaked"
            );
            return;
        };

        warn!(
            container_id = %container_id,
            "instance dropped before removal settled; scheduling removal"
        );
        let runtime = Arc::clone(&self.runtime);
        drop(handle.spawn(async move {
            if let Err(teardown) = remove_with_retry(runtime.as_ref(), &container_id).await {
                error!(error = %teardown, "background container removal failed");
            }
        }));
    }
}

async fn remove_with_retry<R: ContainerRuntime + ?Sized>(
    runtime: &R,
    container_id: &str,
) -> Result<(), TeardownError> {
    let mut last_error = String::new();
    for attempt in 1..=TEARDOWN_ATTEMPTS {
        match runtime.remove_container(container_id).await {
            Ok(()) => {
                debug!(container_id, attempt, "container removed");
                return Ok(());
            }
            Err(removal) if is_not_found(&removal) => {
                debug!(container_id, "container already removed");
                return Ok(());
            }
            Err(removal) => {
                warn!(container_id, attempt, error = %removal, "container removal failed");
                last_error = removal.to_string();
            }
        }
        if attempt < TEARDOWN_ATTEMPTS {
            tokio::time::sleep(TEARDOWN_RETRY_DELAY).await;
        }
    }

    Err(TeardownError {
        container_id: String::from(container_id),
        attempts: TEARDOWN_ATTEMPTS,
        message: last_error,
    })
}

/// Map each requested port to the host port the engine published it on.
fn published_ports(
    spec: &ProvisionSpec,
    inspected: &ContainerInspectResponse,
) -> Result<BTreeMap<ContainerPort, u16>, HarnessError> {
    let empty = HashMap::new();
    let bindings = inspected
        .network_settings
        .as_ref()
        .and_then(|settings| settings.ports.as_ref())
        .unwrap_or(&empty);

    spec.ports()
        .iter()
        .map(|port| {
            bindings
                .get(&port.to_string())
                .and_then(Option::as_ref)
                .and_then(|published| preferred_host_port(published))
                .map(|external| (*port, external))
                .ok_or_else(|| HarnessError::ProvisioningFailed {
                    image: String::from(spec.image()),
                    message: format!("engine published no host port for {port}"),
                })
        })
        .collect()
}

/// First usable host port, preferring IPv4 bindings.
fn preferred_host_port(bindings: &[PortBinding]) -> Option<u16> {
    let parse = |binding: &PortBinding| {
        binding
            .host_port
            .as_deref()
            .and_then(|value| value.parse::<u16>().ok())
            .filter(|value| *value != 0)
    };
    let is_ipv4 = |binding: &&PortBinding| {
        binding
            .host_ip
            .as_deref()
            .is_none_or(|ip| !ip.contains(':'))
    };

    bindings
        .iter()
        .filter(is_ipv4)
        .find_map(parse)
        .or_else(|| bindings.iter().find_map(parse))
}
