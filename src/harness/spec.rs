//! Provisioning request types.
//!
//! A [`ProvisionSpec`] is fully built before provisioning begins and is never
//! mutated afterwards; the builder methods consume and return it.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::readiness::ReadinessRule;
use crate::error::{ConfigError, EphemeraError};

/// Default time allowed for a started container to report readiness.
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(60);

/// Transport protocol of an exposed container port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Protocol {
    /// TCP.
    #[default]
    Tcp,
    /// UDP.
    Udp,
}

impl Protocol {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
        }
    }
}

/// A port inside the container, e.g. `5432/tcp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContainerPort {
    number: u16,
    protocol: Protocol,
}

impl ContainerPort {
    /// A TCP port.
    ///
    /// Port 0 is accepted here but rejected by [`crate::harness::Provisioner::start`].
    #[must_use]
    pub const fn tcp(number: u16) -> Self {
        Self {
            number,
            protocol: Protocol::Tcp,
        }
    }

    /// A UDP port.
    #[must_use]
    pub const fn udp(number: u16) -> Self {
        Self {
            number,
            protocol: Protocol::Udp,
        }
    }

    /// The port number.
    #[must_use]
    pub const fn number(self) -> u16 {
        self.number
    }

    /// The transport protocol.
    #[must_use]
    pub const fn protocol(self) -> Protocol {
        self.protocol
    }
}

impl From<u16> for ContainerPort {
    fn from(number: u16) -> Self {
        Self::tcp(number)
    }
}

impl fmt::Display for ContainerPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.number, self.protocol.as_str())
    }
}

impl FromStr for ContainerPort {
    type Err = EphemeraError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| {
            EphemeraError::from(ConfigError::InvalidValue {
                field: String::from("port"),
                reason: format!("'{value}' {reason}"),
            })
        };

        let (number_text, protocol_text) = value.trim().split_once('/').unwrap_or((value.trim(), "tcp"));
        let number = number_text
            .parse::<u16>()
            .map_err(|_| invalid("is not a valid port number"))?;
        if number == 0 {
            return Err(invalid("must be greater than zero"));
        }
        let protocol = match protocol_text.to_ascii_lowercase().as_str() {
            "tcp" => Protocol::Tcp,
            "udp" => Protocol::Udp,
            _ => return Err(invalid("has an unsupported protocol")),
        };

        Ok(Self { number, protocol })
    }
}

/// When the provisioner pulls the image before creating the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PullPolicy {
    /// Pull only when the engine does not have the image locally.
    #[default]
    Missing,
    /// Always pull before creating the container.
    Always,
    /// Never pull; creation fails if the image is absent.
    Never,
}

impl FromStr for PullPolicy {
    type Err = EphemeraError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "missing" => Ok(Self::Missing),
            "always" => Ok(Self::Always),
            "never" => Ok(Self::Never),
            _ => Err(ConfigError::InvalidValue {
                field: String::from("pull_policy"),
                reason: format!("expected missing, always or never, got '{value}'"),
            }
            .into()),
        }
    }
}

/// Credentials a client uses to authenticate against the provisioned service.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    /// User name.
    pub user: String,
    /// Password.
    pub password: String,
    /// Database or namespace to connect to.
    pub database: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .finish()
    }
}

/// Everything needed to provision one ephemeral container.
#[derive(Debug, Clone)]
pub struct ProvisionSpec {
    image: String,
    ports: BTreeSet<ContainerPort>,
    env: BTreeMap<String, String>,
    readiness: ReadinessRule,
    startup_timeout: Duration,
    pull_policy: PullPolicy,
    name: Option<String>,
    credentials: Credentials,
}

impl ProvisionSpec {
    /// Create a spec for `image` gated on `readiness`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingRequired` when `image` is empty or
    /// whitespace-only.
    pub fn new(image: impl Into<String>, readiness: ReadinessRule) -> Result<Self, EphemeraError> {
        let image_value = image.into();
        let trimmed = image_value.trim();
        if trimmed.is_empty() {
            return Err(ConfigError::MissingRequired {
                field: String::from("image"),
            }
            .into());
        }

        Ok(Self {
            image: String::from(trimmed),
            ports: BTreeSet::new(),
            env: BTreeMap::new(),
            readiness,
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
            pull_policy: PullPolicy::default(),
            name: None,
            credentials: Credentials::default(),
        })
    }

    /// Expose an internal port on an engine-assigned host port.
    #[must_use]
    pub fn with_port(mut self, port: impl Into<ContainerPort>) -> Self {
        self.ports.insert(port.into());
        self
    }

    /// Inject one environment variable.
    #[must_use]
    pub fn with_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(name.into(), value.into());
        self
    }

    /// Bound the readiness wait.
    #[must_use]
    pub const fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    /// Choose when the image is pulled.
    #[must_use]
    pub const fn with_pull_policy(mut self, policy: PullPolicy) -> Self {
        self.pull_policy = policy;
        self
    }

    /// Name the container; blank names are ignored.
    #[must_use]
    pub fn with_name(mut self, name: Option<String>) -> Self {
        self.name = name.filter(|value| !value.trim().is_empty());
        self
    }

    /// Record the credentials clients should use against the service.
    #[must_use]
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// The image reference.
    #[must_use]
    pub fn image(&self) -> &str {
        &self.image
    }

    /// Exposed internal ports.
    #[must_use]
    pub const fn ports(&self) -> &BTreeSet<ContainerPort> {
        &self.ports
    }

    /// Injected environment, ordered by name.
    #[must_use]
    pub const fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Environment in the engine's `KEY=value` form.
    #[must_use]
    pub fn env_entries(&self) -> Vec<String> {
        self.env
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect()
    }

    /// The readiness rule gating provisioning.
    #[must_use]
    pub const fn readiness(&self) -> &ReadinessRule {
        &self.readiness
    }

    /// Time allowed for readiness after the container starts.
    #[must_use]
    pub const fn startup_timeout(&self) -> Duration {
        self.startup_timeout
    }

    /// Image pull policy.
    #[must_use]
    pub const fn pull_policy(&self) -> PullPolicy {
        self.pull_policy
    }

    /// Optional container name.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Credentials for clients of the service.
    #[must_use]
    pub const fn credentials(&self) -> &Credentials {
        &self.credentials
    }
}
