//! Maps Bollard connection failures onto semantic `EngineError` variants.

use std::io::ErrorKind;
use std::path::Path;

use crate::error::EngineError;

/// Filesystem path of a `unix://` or `npipe://` endpoint, if it has one.
fn socket_path(socket_uri: &str) -> Option<&Path> {
    socket_uri
        .strip_prefix("unix://")
        .or_else(|| socket_uri.strip_prefix("npipe://"))
        .map(Path::new)
}

/// Classify a `Bollard` connection error for the given endpoint.
///
/// Missing and inaccessible sockets are reported with their path; anything
/// else, including every HTTP endpoint failure, becomes `ConnectionFailed`.
pub(super) fn classify_connection_error(
    error: &bollard::errors::Error,
    socket_uri: &str,
) -> EngineError {
    let message = error.to_string();
    let Some(path) = socket_path(socket_uri) else {
        return EngineError::ConnectionFailed { message };
    };

    let kind = match error {
        bollard::errors::Error::SocketNotFoundError(_) => Some(ErrorKind::NotFound),
        bollard::errors::Error::IOError { err } => {
            io_error_kind_in_chain(err).or_else(|| Some(err.kind()))
        }
        other => io_error_kind_in_chain(other),
    };

    match kind {
        Some(ErrorKind::NotFound) => EngineError::SocketNotFound {
            path: path.to_path_buf(),
        },
        Some(ErrorKind::PermissionDenied) => EngineError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => EngineError::ConnectionFailed { message },
    }
}

/// First `io::Error` kind found in the source chain below `error`.
fn io_error_kind_in_chain(error: &dyn std::error::Error) -> Option<ErrorKind> {
    let mut current = error.source();
    while let Some(err) = current {
        if let Some(io_err) = err.downcast_ref::<std::io::Error>() {
            return Some(io_err.kind());
        }
        current = err.source();
    }
    None
}
