//! Scoped acquisition of a ready container.
//!
//! [`Provisioner::with_instance`] provisions, hands the ready instance to a
//! body, and then terminates the container whether the body returned a
//! value, returned an error, or panicked. A teardown failure is reported but
//! never replaces the body's own error. If the whole scope future is dropped,
//! the instance's `Drop` schedules removal instead.

use std::error::Error as StdError;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use thiserror::Error;
use tracing::error;

use super::instance::RunningInstance;
use super::provision::Provisioner;
use super::spec::ProvisionSpec;
use crate::engine::ContainerRuntime;
use crate::error::{HarnessError, TeardownError};

/// Failure of a scoped container acquisition.
#[derive(Debug, Error)]
pub enum ScopeError<E>
where
    E: StdError + 'static,
{
    /// The container never became ready; the body did not run.
    #[error(transparent)]
    Provision(HarnessError),

    /// The body failed. Teardown may also have failed.
    #[error("scoped body failed{}", teardown_suffix(.teardown.as_ref()))]
    Body {
        /// The body's error.
        source: E,
        /// Secondary teardown failure, if any.
        teardown: Option<TeardownError>,
    },

    /// The body succeeded but the container could not be removed.
    #[error(transparent)]
    Teardown(TeardownError),
}

fn teardown_suffix(teardown: Option<&TeardownError>) -> String {
    teardown.map_or_else(String::new, |failure| {
        format!(" (teardown also failed: {failure})")
    })
}

impl<E> ScopeError<E>
where
    E: StdError + 'static,
{
    /// The body's error, when the body ran and failed.
    #[must_use]
    pub const fn body_error(&self) -> Option<&E> {
        match self {
            Self::Body { source, .. } => Some(source),
            Self::Provision(_) | Self::Teardown(_) => None,
        }
    }

    /// The teardown failure, whether primary or secondary.
    #[must_use]
    pub const fn teardown_error(&self) -> Option<&TeardownError> {
        match self {
            Self::Body { teardown, .. } => teardown.as_ref(),
            Self::Teardown(teardown) => Some(teardown),
            Self::Provision(_) => None,
        }
    }
}

impl<R: ContainerRuntime> Provisioner<R> {
    /// Provision `spec`, run `body` against the ready instance, then
    /// terminate the container on every exit path.
    ///
    /// # Errors
    ///
    /// - `ScopeError::Provision` when the container never becomes ready.
    /// - `ScopeError::Body` when `body` fails, with any teardown failure
    ///   attached.
    /// - `ScopeError::Teardown` when `body` succeeds but removal fails.
    ///
    /// # Panics
    ///
    /// A panic raised by `body` is resumed after teardown has run.
    pub async fn with_instance<T, E, F>(
        &self,
        spec: &ProvisionSpec,
        body: F,
    ) -> Result<T, ScopeError<E>>
    where
        E: StdError + 'static,
        F: AsyncFnOnce(&RunningInstance<R>) -> Result<T, E>,
    {
        let instance = self.provision(spec).await.map_err(ScopeError::Provision)?;
        let outcome = AssertUnwindSafe(body(&instance)).catch_unwind().await;
        let teardown = instance.terminate().await;

        match outcome {
            Ok(Ok(value)) => teardown.map(|()| value).map_err(ScopeError::Teardown),
            Ok(Err(source)) => {
                if let Err(ref failure) = teardown {
                    error!(error = %failure, "teardown failed after body error");
                }
                Err(ScopeError::Body {
                    source,
                    teardown: teardown.err(),
                })
            }
            Err(panic) => {
                if let Err(failure) = teardown {
                    error!(error = %failure, "teardown failed after body panic");
                }
                std::panic::resume_unwind(panic)
            }
        }
    }
}
