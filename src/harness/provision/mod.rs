//! Container provisioning.
//!
//! The provisioner translates a [`ProvisionSpec`] into `Bollard` create
//! payloads, starts the container, and waits for readiness. Any container it
//! created is removed before a provisioning failure is returned.

use std::collections::HashMap;
use std::sync::Arc;

use bollard::models::{ContainerCreateBody, HostConfig, PortBinding};
use bollard::query_parameters::{CreateContainerOptions, CreateContainerOptionsBuilder};
use tracing::{debug, error, info};

use super::instance::RunningInstance;
use super::spec::{ProvisionSpec, PullPolicy};
use crate::engine::ContainerRuntime;
use crate::error::HarnessError;

/// Label applied to every container the harness creates.
pub const MANAGED_LABEL: &str = "ephemera.managed";

const DEFAULT_HOST: &str = "localhost";

/// Creates, starts, and readies containers through a [`ContainerRuntime`].
#[derive(Debug)]
pub struct Provisioner<R: ContainerRuntime> {
    runtime: Arc<R>,
    host: String,
}

impl<R: ContainerRuntime> Clone for Provisioner<R> {
    fn clone(&self) -> Self {
        Self {
            runtime: Arc::clone(&self.runtime),
            host: self.host.clone(),
        }
    }
}

impl<R: ContainerRuntime> Provisioner<R> {
    /// Provisioner whose endpoints are reported on `localhost`.
    #[must_use]
    pub fn new(runtime: Arc<R>) -> Self {
        Self {
            runtime,
            host: String::from(DEFAULT_HOST),
        }
    }

    /// Report endpoints on `host` instead of `localhost`.
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Host that resolved endpoints carry.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The runtime this provisioner drives.
    #[must_use]
    pub const fn runtime(&self) -> &Arc<R> {
        &self.runtime
    }

    /// Create and start a container without waiting for readiness.
    ///
    /// # Errors
    ///
    /// Returns `ProvisioningFailed` when a requested port is 0, the image
    /// cannot be pulled, or the container cannot be created or started. A
    /// container that was created but failed to start is removed first.
    pub async fn start(&self, spec: &ProvisionSpec) -> Result<RunningInstance<R>, HarnessError> {
        if let Some(port) = spec.ports().iter().find(|port| port.number() == 0) {
            return Err(HarnessError::ProvisioningFailed {
                image: String::from(spec.image()),
                message: format!("cannot expose {port}: port must be greater than zero"),
            });
        }
        self.ensure_image(spec).await?;

        let created = self
            .runtime
            .create_container(build_create_options(spec.name()), build_create_body(spec))
            .await
            .map_err(|error| provisioning_failed(spec, "failed to create container", &error))?;
        debug!(container_id = %created.id, image = spec.image(), "container created");

        let instance = RunningInstance::new(
            Arc::clone(&self.runtime),
            created.id,
            self.host.clone(),
            spec.clone(),
        );

        if let Err(start_error) = self.runtime.start_container(instance.container_id()).await {
            let failure = provisioning_failed(spec, "failed to start container", &start_error);
            discard(instance).await;
            return Err(failure);
        }

        info!(
            container_id = instance.container_id(),
            image = spec.image(),
            "container started"
        );
        Ok(instance)
    }

    /// Create, start, and wait for a container to become ready.
    ///
    /// Returns control only once the readiness rule is satisfied or the
    /// spec's startup timeout elapses.
    ///
    /// # Errors
    ///
    /// Returns `ProvisioningFailed` for engine failures and the readiness
    /// failure (`ReadinessTimeout`, `ExitedBeforeReady`, `LogStreamFailed`)
    /// otherwise. No container is left behind on any error path.
    pub async fn provision(&self, spec: &ProvisionSpec) -> Result<RunningInstance<R>, HarnessError> {
        let mut instance = self.start(spec).await?;
        if let Err(readiness_error) = instance.await_ready().await {
            discard(instance).await;
            return Err(readiness_error);
        }
        Ok(instance)
    }

    async fn ensure_image(&self, spec: &ProvisionSpec) -> Result<(), HarnessError> {
        let image = spec.image();
        let should_pull = match spec.pull_policy() {
            PullPolicy::Never => false,
            PullPolicy::Always => true,
            PullPolicy::Missing => !self
                .runtime
                .image_exists(image)
                .await
                .map_err(|error| provisioning_failed(spec, "failed to inspect image", &error))?,
        };

        if should_pull {
            info!(image, "pulling image");
            self.runtime
                .pull_image(image)
                .await
                .map_err(|error| provisioning_failed(spec, "failed to pull image", &error))?;
        }
        Ok(())
    }
}

/// Remove a container that will not be handed to the caller.
async fn discard<R: ContainerRuntime>(instance: RunningInstance<R>) {
    if let Err(teardown) = instance.terminate().await {
        error!(error = %teardown, "failed to clean up after provisioning failure");
    }
}

fn provisioning_failed(
    spec: &ProvisionSpec,
    context: &str,
    error: &bollard::errors::Error,
) -> HarnessError {
    HarnessError::ProvisioningFailed {
        image: String::from(spec.image()),
        message: format!("{context}: {error}"),
    }
}

fn build_create_options(name: Option<&str>) -> Option<CreateContainerOptions> {
    name.map(|container_name| {
        CreateContainerOptionsBuilder::new()
            .name(container_name)
            .build()
    })
}

fn build_create_body(spec: &ProvisionSpec) -> ContainerCreateBody {
    let env = spec.env_entries();
    let exposed_ports: HashMap<String, HashMap<(), ()>> = spec
        .ports()
        .iter()
        .map(|port| (port.to_string(), HashMap::new()))
        .collect();
    let port_bindings: HashMap<String, Option<Vec<PortBinding>>> = spec
        .ports()
        .iter()
        .map(|port| (port.to_string(), Some(vec![PortBinding::default()])))
        .collect();

    ContainerCreateBody {
        image: Some(String::from(spec.image())),
        env: (!env.is_empty()).then_some(env),
        labels: Some(HashMap::from([(
            String::from(MANAGED_LABEL),
            String::from("true"),
        )])),
        exposed_ports: (!exposed_ports.is_empty()).then_some(exposed_ports),
        host_config: Some(HostConfig {
            port_bindings: (!port_bindings.is_empty()).then_some(port_bindings),
            ..HostConfig::default()
        }),
        ..ContainerCreateBody::default()
    }
}
