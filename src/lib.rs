//! Disposable containerised dependencies for integration tests.
//!
//! `ephemera` provisions a throwaway container (a postgres server, say),
//! waits until the service inside reports readiness on its own output,
//! resolves the host port the engine published it on, and removes the
//! container again on every exit path.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use ephemera::config::PostgresConfig;
//! use ephemera::engine::EngineConnector;
//! use ephemera::harness::Provisioner;
//! use ephemera::probe::{POSTGRES_PORT, PostgresRepository, Repository, postgres_spec};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let docker = EngineConnector::connect_and_verify_async("unix:///var/run/docker.sock").await?;
//! let provisioner = Provisioner::new(Arc::new(docker));
//! let spec = postgres_spec(&PostgresConfig::default())?;
//!
//! provisioner
//!     .with_instance(&spec, async |instance| {
//!         let target = instance.connection_target(POSTGRES_PORT)?;
//!         let repository = PostgresRepository::connect(&target).await?;
//!         repository.ping().await?;
//!         Ok::<_, ephemera::error::EphemeraError>(())
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`config`]: Layered configuration (CLI > env > file > defaults)
//! - [`engine`]: Container engine connection and the runtime seam
//! - [`error`]: Semantic error types for the library
//! - [`harness`]: Readiness detection, provisioning, endpoint resolution, and
//!   scoped teardown
//! - [`probe`]: Connectivity probe and the postgres preset

pub mod config;
pub mod engine;
pub mod error;
pub mod harness;
pub mod probe;
