//! Container runtime capability consumed by the provisioning harness.
//!
//! The harness never talks to `Docker` directly. It goes through
//! [`ContainerRuntime`], which keeps provisioning, readiness, and teardown
//! logic testable without a running daemon.

use std::future::Future;
use std::pin::Pin;

use bollard::Docker;
use bollard::container::LogOutput;
use bollard::errors::Error as BollardError;
use bollard::models::{ContainerCreateBody, ContainerCreateResponse, ContainerInspectResponse};
use bollard::query_parameters::{
    CreateContainerOptions, CreateImageOptionsBuilder, InspectContainerOptions,
    LogsOptionsBuilder, RemoveContainerOptionsBuilder, StartContainerOptions,
};
use futures_util::{Stream, StreamExt};

/// Boxed future type returned by [`ContainerRuntime`] operations.
pub type EngineFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, BollardError>> + Send + 'a>>;

/// Live output stream of a container.
pub type LogStream = Pin<Box<dyn Stream<Item = Result<LogOutput, BollardError>> + Send>>;

/// Operations the harness needs from a container engine.
pub trait ContainerRuntime: Send + Sync + 'static {
    /// Report whether `image` is present in the engine's local store.
    fn image_exists(&self, image: &str) -> EngineFuture<'_, bool>;

    /// Pull `image`, waiting for the pull to finish.
    fn pull_image(&self, image: &str) -> EngineFuture<'_, ()>;

    /// Create a container from `Bollard` options and body payload.
    fn create_container(
        &self,
        options: Option<CreateContainerOptions>,
        config: ContainerCreateBody,
    ) -> EngineFuture<'_, ContainerCreateResponse>;

    /// Start a created container.
    fn start_container(&self, container_id: &str) -> EngineFuture<'_, ()>;

    /// Follow the container's stdout and stderr from the beginning.
    fn container_logs(&self, container_id: &str) -> LogStream;

    /// Inspect a container, including its published port bindings.
    fn inspect_container(&self, container_id: &str) -> EngineFuture<'_, ContainerInspectResponse>;

    /// Force-remove a container together with its anonymous volumes.
    fn remove_container(&self, container_id: &str) -> EngineFuture<'_, ()>;
}

impl ContainerRuntime for Docker {
    fn image_exists(&self, image: &str) -> EngineFuture<'_, bool> {
        let image_owned = String::from(image);
        Box::pin(async move {
            match Self::inspect_image(self, &image_owned).await {
                Ok(_) => Ok(true),
                Err(error) if is_not_found(&error) => Ok(false),
                Err(error) => Err(error),
            }
        })
    }

    fn pull_image(&self, image: &str) -> EngineFuture<'_, ()> {
        let (repository, tag) = split_image_reference(image);
        let options = CreateImageOptionsBuilder::new()
            .from_image(repository)
            .tag(tag)
            .build();
        Box::pin(async move {
            let mut progress = Self::create_image(self, Some(options), None, None);
            while let Some(update) = progress.next().await {
                update?;
            }
            Ok(())
        })
    }

    fn create_container(
        &self,
        options: Option<CreateContainerOptions>,
        config: ContainerCreateBody,
    ) -> EngineFuture<'_, ContainerCreateResponse> {
        Box::pin(async move { Self::create_container(self, options, config).await })
    }

    fn start_container(&self, container_id: &str) -> EngineFuture<'_, ()> {
        let container_id_owned = String::from(container_id);
        Box::pin(async move {
            Self::start_container(self, &container_id_owned, None::<StartContainerOptions>).await
        })
    }

    fn container_logs(&self, container_id: &str) -> LogStream {
        let options = LogsOptionsBuilder::new()
            .follow(true)
            .stdout(true)
            .stderr(true)
            .build();
        Box::pin(Self::logs(self, container_id, Some(options)))
    }

    fn inspect_container(&self, container_id: &str) -> EngineFuture<'_, ContainerInspectResponse> {
        let container_id_owned = String::from(container_id);
        Box::pin(async move {
            Self::inspect_container(self, &container_id_owned, None::<InspectContainerOptions>)
                .await
        })
    }

    fn remove_container(&self, container_id: &str) -> EngineFuture<'_, ()> {
        let container_id_owned = String::from(container_id);
        let options = RemoveContainerOptionsBuilder::new()
            .force(true)
            .v(true)
            .build();
        Box::pin(async move {
            Self::remove_container(self, &container_id_owned, Some(options)).await
        })
    }
}

/// Whether the engine answered with `404 Not Found`.
#[must_use]
pub fn is_not_found(error: &BollardError) -> bool {
    matches!(
        error,
        BollardError::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}

/// Split an image reference into repository and tag, defaulting to `latest`.
///
/// Digest references (`name@sha256:...`) are returned whole with an empty tag
/// so the engine resolves the digest itself.
#[must_use]
pub fn split_image_reference(image: &str) -> (&str, &str) {
    if image.contains('@') {
        return (image, "");
    }

    let last_segment_start = image.rfind('/').map_or(0, |index| index + 1);
    match image.rfind(':') {
        Some(colon) if colon > last_segment_start => {
            let (repository, tag_with_colon) = image.split_at(colon);
            (repository, tag_with_colon.trim_start_matches(':'))
        }
        _ => (image, "latest"),
    }
}
