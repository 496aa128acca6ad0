//! Socket resolution and container engine connection.
//!
//! This module resolves container engine socket endpoints from multiple
//! sources (configuration, environment variables, platform defaults),
//! establishes connections using the Bollard library, and derives the host
//! name under which published container ports are reachable.

mod error_classification;
mod health_check;

use bollard::Docker;

use self::error_classification::classify_connection_error;
use crate::error::EphemeraError;

/// Variables consulted, in order, when no socket is configured.
const FALLBACK_ENV_VARS: &[&str] = &["DOCKER_HOST", "CONTAINER_HOST", "PODMAN_HOST"];

/// Client-side request timeout for engine API calls, in seconds.
const CONNECTION_TIMEOUT_SECS: u64 = 120;

/// Upper bound on a single engine ping, in seconds.
const HEALTH_CHECK_TIMEOUT_SECS: u64 = 10;

/// Host on which a local engine publishes container ports.
const LOCAL_HOST: &str = "localhost";

#[cfg(unix)]
const DEFAULT_SOCKET: &str = "unix:///var/run/docker.sock";

#[cfg(windows)]
const DEFAULT_SOCKET: &str = "npipe:////./pipe/docker_engine";

/// Looks up an engine socket in the process environment.
///
/// Generic over `mockable::Env` so resolution can be driven by `MockEnv`.
pub struct SocketResolver<'a, E: mockable::Env> {
    env: &'a E,
}

impl<'a, E: mockable::Env> SocketResolver<'a, E> {
    /// Wrap an environment provider.
    #[must_use]
    pub const fn new(env: &'a E) -> Self {
        Self { env }
    }

    /// First non-empty value of `DOCKER_HOST`, `CONTAINER_HOST`, `PODMAN_HOST`.
    #[must_use]
    pub fn resolve_from_env(&self) -> Option<String> {
        FALLBACK_ENV_VARS
            .iter()
            .filter_map(|var_name| self.env.string(var_name))
            .find(|value| !value.is_empty())
    }
}

/// An engine address normalised to a URI `bollard` accepts.
#[derive(Debug, PartialEq, Eq)]
enum EngineEndpoint {
    /// Unix socket or Windows named pipe.
    Local(String),
    /// HTTP or HTTPS API; `tcp://` is rewritten to `http://`.
    Remote(String),
}

impl EngineEndpoint {
    fn parse(socket: &str) -> Self {
        if let Some(address) = socket.strip_prefix("tcp://") {
            return Self::Remote(format!("http://{address}"));
        }
        if socket.starts_with("http://") || socket.starts_with("https://") {
            return Self::Remote(String::from(socket));
        }
        if socket.starts_with("unix://") || socket.starts_with("npipe://") {
            return Self::Local(String::from(socket));
        }
        // Bare paths: pipe syntax is recognised regardless of platform.
        if socket.starts_with("\\\\") || socket.starts_with("//") {
            Self::Local(format!("npipe://{socket}"))
        } else {
            Self::Local(format!("unix://{socket}"))
        }
    }

    fn uri(&self) -> &str {
        match self {
            Self::Local(uri) | Self::Remote(uri) => uri,
        }
    }

    /// Host name of a remote endpoint, without user info or port.
    fn remote_host(&self) -> Option<&str> {
        let Self::Remote(uri) = self else {
            return None;
        };
        let authority = uri
            .split_once("://")
            .map_or(uri.as_str(), |(_, rest)| rest)
            .split('/')
            .next()
            .unwrap_or_default();
        let host_port = authority
            .rsplit_once('@')
            .map_or(authority, |(_, without_userinfo)| without_userinfo);
        Some(strip_port(host_port)).filter(|host| !host.is_empty())
    }
}

/// Entry points for reaching a Docker or Podman engine.
pub struct EngineConnector;

impl EngineConnector {
    /// Build a client for the engine at `socket`.
    ///
    /// Accepts `unix://`, `npipe://`, `tcp://`, `http://` and `https://`
    /// URIs as well as bare paths (`//` or `\\` prefixes are named pipes,
    /// anything else a Unix socket). No request is sent.
    ///
    /// # Errors
    ///
    /// `EngineError::SocketNotFound` or `EngineError::PermissionDenied`
    /// for unusable local sockets, `EngineError::ConnectionFailed`
    /// otherwise.
    pub fn connect(socket: &str) -> Result<Docker, EphemeraError> {
        let endpoint = EngineEndpoint::parse(socket);
        let connection = match endpoint {
            EngineEndpoint::Remote(ref uri) => {
                Docker::connect_with_http(uri, CONNECTION_TIMEOUT_SECS, bollard::API_DEFAULT_VERSION)
            }
            EngineEndpoint::Local(ref uri) => Docker::connect_with_socket(
                uri,
                CONNECTION_TIMEOUT_SECS,
                bollard::API_DEFAULT_VERSION,
            ),
        };

        connection.map_err(|error| classify_connection_error(&error, endpoint.uri()).into())
    }

    /// Pick the socket to use: `config_socket` when non-empty, then the
    /// fallback environment variables, then the platform default.
    #[must_use]
    pub fn resolve_socket<E: mockable::Env>(
        config_socket: Option<&str>,
        resolver: &SocketResolver<'_, E>,
    ) -> String {
        config_socket
            .filter(|socket| !socket.is_empty())
            .map(String::from)
            .or_else(|| resolver.resolve_from_env())
            .unwrap_or_else(|| String::from(DEFAULT_SOCKET))
    }

    /// Host on which containers started through `socket` publish ports.
    ///
    /// Remote engines publish on their own host; local sockets and named
    /// pipes on `localhost`.
    #[must_use]
    pub fn published_host(socket: &str) -> String {
        String::from(
            EngineEndpoint::parse(socket)
                .remote_host()
                .unwrap_or(LOCAL_HOST),
        )
    }
}

/// Strip a trailing `:port`, keeping bracketed IPv6 hosts intact.
fn strip_port(authority: &str) -> &str {
    if let Some(rest) = authority.strip_prefix('[') {
        return rest.split_once(']').map_or(rest, |(host, _)| host);
    }

    authority
        .rsplit_once(':')
        .map_or(authority, |(host, _)| host)
}
