//! Reaching the container engine, and the runtime seam the harness drives.
//!
//! The socket is chosen from, in order: `--engine-socket` or the
//! `engine_socket` setting (which also covers `EPHEMERA_ENGINE_SOCKET`),
//! then `DOCKER_HOST`, `CONTAINER_HOST`, `PODMAN_HOST`, then the platform
//! default (`/var/run/docker.sock` on Unix, the `docker_engine` pipe on
//! Windows).

mod connection;
mod runtime;

pub use connection::{EngineConnector, SocketResolver};
pub use runtime::{
    ContainerRuntime, EngineFuture, LogStream, is_not_found, split_image_reference,
};
