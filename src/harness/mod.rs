//! Ephemeral container provisioning harness.
//!
//! The harness composes four pieces around the engine's [`ContainerRuntime`]:
//!
//! - [`readiness`]: watches container output until a [`ReadinessRule`] holds.
//! - [`Provisioner`]: pulls, creates, and starts containers from a
//!   [`ProvisionSpec`] and blocks until they are ready.
//! - [`RunningInstance::resolve`]: maps internal ports to host endpoints once
//!   an instance is ready.
//! - [`Provisioner::with_instance`]: scopes an instance to a body and removes
//!   the container on every exit path.
//!
//! [`ContainerRuntime`]: crate::engine::ContainerRuntime

mod guard;
mod instance;
mod provision;
pub mod readiness;
mod spec;

#[cfg(test)]
mod test_support;

pub use guard::ScopeError;
pub use instance::{ConnectionTarget, Endpoint, InstanceState, RunningInstance};
pub use provision::{MANAGED_LABEL, Provisioner};
pub use readiness::{LogPattern, LogSource, ReadinessRule};
pub use spec::{
    ContainerPort, Credentials, DEFAULT_STARTUP_TIMEOUT, Protocol, ProvisionSpec, PullPolicy,
};
