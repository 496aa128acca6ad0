//! Scenario state for container lifecycle behavioural tests.

use rstest::fixture;
use rstest_bdd::Slot;
use rstest_bdd_macros::ScenarioState;

/// What the mocked container writes to its log before its stream ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ContainerBehaviour {
    /// Logs the ready line and keeps running.
    LogsReadyLine,
    /// Logs initialisation noise and exits.
    ExitsEarly,
}

/// Flattened outcome of a scoped acquisition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ScopeOutcome {
    /// The body returned the host port it resolved.
    Resolved(u16),
    /// Provisioning failed before the body ran.
    ProvisionFailed { exited_early: bool },
    /// The body failed; `teardown_failed` records a secondary failure.
    BodyFailed { teardown_failed: bool },
    /// The body succeeded but removal failed.
    TeardownFailed { attempts: u32 },
}

#[derive(Default, ScenarioState)]
pub(crate) struct LifecycleState {
    pub(crate) internal_port: Slot<u16>,
    pub(crate) host_port: Slot<u16>,
    pub(crate) behaviour: Slot<ContainerBehaviour>,
    pub(crate) removal_fails: Slot<bool>,
    pub(crate) body_fails: Slot<bool>,
    pub(crate) body_ran: Slot<bool>,
    pub(crate) removals: Slot<usize>,
    pub(crate) outcome: Slot<ScopeOutcome>,
}

#[fixture]
pub(crate) fn lifecycle_state() -> LifecycleState {
    let state = LifecycleState::default();
    state.behaviour.set(ContainerBehaviour::LogsReadyLine);
    state.removal_fails.set(false);
    state.body_fails.set(false);
    state.body_ran.set(false);
    state
}
