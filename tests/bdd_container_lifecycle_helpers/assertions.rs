//! Assertion helpers for container lifecycle behavioural tests.

use rstest_bdd_macros::then;

use super::StepResult;
use super::state::{LifecycleState, ScopeOutcome};

fn outcome(lifecycle_state: &LifecycleState) -> StepResult<ScopeOutcome> {
    lifecycle_state
        .outcome
        .get()
        .ok_or_else(|| String::from("outcome should be set"))
}

#[then("the body observes host port {expected}")]
fn body_observes_host_port(lifecycle_state: &LifecycleState, expected: u16) -> StepResult<()> {
    match outcome(lifecycle_state)? {
        ScopeOutcome::Resolved(port) if port == expected => Ok(()),
        other => Err(format!("expected host port {expected}, got {other:?}")),
    }
}

#[then("the scope reports a body failure without teardown failure")]
fn body_failure_without_teardown(lifecycle_state: &LifecycleState) -> StepResult<()> {
    match outcome(lifecycle_state)? {
        ScopeOutcome::BodyFailed {
            teardown_failed: false,
        } => Ok(()),
        other => Err(format!("expected a clean body failure, got {other:?}")),
    }
}

#[then("the scope reports a body failure with teardown failure")]
fn body_failure_with_teardown(lifecycle_state: &LifecycleState) -> StepResult<()> {
    match outcome(lifecycle_state)? {
        ScopeOutcome::BodyFailed {
            teardown_failed: true,
        } => Ok(()),
        other => Err(format!(
            "expected a body failure with attached teardown failure, got {other:?}"
        )),
    }
}

#[then("the scope reports the container exited before ready")]
fn container_exited_before_ready(lifecycle_state: &LifecycleState) -> StepResult<()> {
    match outcome(lifecycle_state)? {
        ScopeOutcome::ProvisionFailed { exited_early: true } => Ok(()),
        other => Err(format!("expected an early exit, got {other:?}")),
    }
}

#[then("the scope reports a teardown failure after {expected} attempts")]
fn teardown_failure_after_attempts(
    lifecycle_state: &LifecycleState,
    expected: u32,
) -> StepResult<()> {
    match outcome(lifecycle_state)? {
        ScopeOutcome::TeardownFailed { attempts } if attempts == expected => Ok(()),
        other => Err(format!(
            "expected a teardown failure after {expected} attempts, got {other:?}"
        )),
    }
}

#[then("the body did not run")]
fn body_did_not_run(lifecycle_state: &LifecycleState) -> StepResult<()> {
    if lifecycle_state.body_ran.get().unwrap_or(false) {
        return Err(String::from("body should not have run"));
    }
    Ok(())
}

#[then("the removal count is {expected}")]
fn removal_count_is(lifecycle_state: &LifecycleState, expected: usize) -> StepResult<()> {
    let removals = lifecycle_state
        .removals
        .get()
        .ok_or_else(|| String::from("removal count should be set"))?;
    if removals == expected {
        Ok(())
    } else {
        Err(format!("expected {expected} removals, got {removals}"))
    }
}
