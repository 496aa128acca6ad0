//! Given/when steps for container lifecycle scenarios.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use bollard::container::LogOutput;
use bollard::errors::Error as BollardError;
use bollard::models::{
    ContainerCreateBody, ContainerCreateResponse, ContainerInspectResponse, NetworkSettings,
    PortBinding,
};
use bollard::query_parameters::CreateContainerOptions;
use ephemera::engine::{ContainerRuntime, EngineFuture, LogStream};
use ephemera::error::HarnessError;
use ephemera::harness::{
    ProvisionSpec, Provisioner, PullPolicy, ReadinessRule, RunningInstance, ScopeError,
};
use futures_util::{StreamExt, stream};
use mockall::mock;
use rstest_bdd_macros::{given, when};

use super::StepResult;
use super::state::{ContainerBehaviour, LifecycleState, ScopeOutcome};

const READY_LINE: &str = "server is ready to accept connections";

mock! {
    LifecycleRuntime {}

    impl ContainerRuntime for LifecycleRuntime {
        fn image_exists(&self, image: &str) -> EngineFuture<'_, bool>;
        fn pull_image(&self, image: &str) -> EngineFuture<'_, ()>;
        fn create_container(
            &self,
            options: Option<CreateContainerOptions>,
            config: ContainerCreateBody,
        ) -> EngineFuture<'_, ContainerCreateResponse>;
        fn start_container(&self, container_id: &str) -> EngineFuture<'_, ()>;
        fn container_logs(&self, container_id: &str) -> LogStream;
        fn inspect_container(&self, container_id: &str) -> EngineFuture<'_, ContainerInspectResponse>;
        fn remove_container(&self, container_id: &str) -> EngineFuture<'_, ()>;
    }
}

#[given("a mock container engine publishing port {internal} on {external}")]
fn given_mock_engine(lifecycle_state: &LifecycleState, internal: u16, external: u16) {
    lifecycle_state.internal_port.set(internal);
    lifecycle_state.host_port.set(external);
}

#[given("the container logs the ready line")]
fn given_container_logs_ready_line(lifecycle_state: &LifecycleState) {
    lifecycle_state
        .behaviour
        .set(ContainerBehaviour::LogsReadyLine);
}

#[given("the container exits without logging the ready line")]
fn given_container_exits_early(lifecycle_state: &LifecycleState) {
    lifecycle_state.behaviour.set(ContainerBehaviour::ExitsEarly);
}

#[given("the engine fails every removal")]
fn given_removal_fails(lifecycle_state: &LifecycleState) {
    lifecycle_state.removal_fails.set(true);
}

#[given("the body fails")]
fn given_body_fails(lifecycle_state: &LifecycleState) {
    lifecycle_state.body_fails.set(true);
}

#[when("the scoped body resolves port {requested}")]
fn when_scoped_body_runs(lifecycle_state: &LifecycleState, requested: u16) -> StepResult<()> {
    let internal = lifecycle_state
        .internal_port
        .get()
        .ok_or_else(|| String::from("internal port should be configured"))?;
    let external = lifecycle_state
        .host_port
        .get()
        .ok_or_else(|| String::from("host port should be configured"))?;
    let behaviour = lifecycle_state
        .behaviour
        .get()
        .unwrap_or(ContainerBehaviour::LogsReadyLine);
    let removal_fails = lifecycle_state.removal_fails.get().unwrap_or(false);
    let body_fails = lifecycle_state.body_fails.get().unwrap_or(false);

    let removals = Arc::new(AtomicUsize::new(0));
    let mut engine = MockLifecycleRuntime::new();
    configure_container(&mut engine, behaviour, internal, external);
    configure_removal(&mut engine, &removals, removal_fails);

    let spec = ProvisionSpec::new(
        "docker.io/library/postgres:16-alpine",
        ReadinessRule::log_contains(READY_LINE),
    )
    .map_err(|e| format!("failed to build spec: {e}"))?
    .with_port(internal)
    .with_pull_policy(PullPolicy::Never)
    .with_startup_timeout(Duration::from_secs(5));
    let provisioner = Provisioner::new(Arc::new(engine));

    let body_ran = AtomicBool::new(false);
    let runtime =
        tokio::runtime::Runtime::new().map_err(|e| format!("failed to create runtime: {e}"))?;
    let result = runtime.block_on(provisioner.with_instance(
        &spec,
        async |instance: &RunningInstance<MockLifecycleRuntime>| {
            body_ran.store(true, Ordering::SeqCst);
            if body_fails {
                return Err(io::Error::other("body failed on purpose"));
            }
            instance
                .resolve(requested)
                .map(|endpoint| endpoint.port)
                .map_err(io::Error::other)
        },
    ));

    lifecycle_state.outcome.set(flatten(result));
    lifecycle_state.body_ran.set(body_ran.load(Ordering::SeqCst));
    lifecycle_state.removals.set(removals.load(Ordering::SeqCst));
    Ok(())
}

fn flatten(result: Result<u16, ScopeError<io::Error>>) -> ScopeOutcome {
    match result {
        Ok(port) => ScopeOutcome::Resolved(port),
        Err(ScopeError::Provision(failure)) => ScopeOutcome::ProvisionFailed {
            exited_early: matches!(failure, HarnessError::ExitedBeforeReady { .. }),
        },
        Err(ScopeError::Body { teardown, .. }) => ScopeOutcome::BodyFailed {
            teardown_failed: teardown.is_some(),
        },
        Err(ScopeError::Teardown(failure)) => ScopeOutcome::TeardownFailed {
            attempts: failure.attempts,
        },
    }
}

fn configure_container(
    engine: &mut MockLifecycleRuntime,
    behaviour: ContainerBehaviour,
    internal: u16,
    external: u16,
) {
    engine.expect_create_container().times(1).returning(|_, _| {
        Box::pin(async {
            Ok(ContainerCreateResponse {
                id: String::from("lifecycle-container"),
                warnings: Vec::new(),
            })
        })
    });
    engine
        .expect_start_container()
        .times(1)
        .returning(|_| Box::pin(async { Ok(()) }));
    engine
        .expect_container_logs()
        .times(1)
        .returning(move |_| log_stream(behaviour));
    engine.expect_inspect_container().returning(move |_| {
        let response = inspect_response(internal, external);
        Box::pin(async move { Ok(response) })
    });
}

fn configure_removal(
    engine: &mut MockLifecycleRuntime,
    removals: &Arc<AtomicUsize>,
    removal_fails: bool,
) {
    let counter = Arc::clone(removals);
    engine.expect_remove_container().returning(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            if removal_fails {
                Err(BollardError::DockerResponseServerError {
                    status_code: 500,
                    message: String::from("engine is busy"),
                })
            } else {
                Ok(())
            }
        })
    });
}

fn log_stream(behaviour: ContainerBehaviour) -> LogStream {
    let lines: &[&str] = match behaviour {
        ContainerBehaviour::LogsReadyLine => &["initialising", READY_LINE],
        ContainerBehaviour::ExitsEarly => &["initialising", "fatal: data directory is corrupt"],
    };
    let items: Vec<Result<LogOutput, BollardError>> = lines
        .iter()
        .map(|line| {
            Ok(LogOutput::StdOut {
                message: Vec::from(format!("{line}\n")).into(),
            })
        })
        .collect();

    match behaviour {
        ContainerBehaviour::LogsReadyLine => {
            Box::pin(stream::iter(items).chain(stream::pending()))
        }
        ContainerBehaviour::ExitsEarly => Box::pin(stream::iter(items)),
    }
}

fn inspect_response(internal: u16, external: u16) -> ContainerInspectResponse {
    let binding = PortBinding {
        host_ip: Some(String::from("0.0.0.0")),
        host_port: Some(external.to_string()),
    };
    let ports = HashMap::from([(format!("{internal}/tcp"), Some(vec![binding]))]);
    ContainerInspectResponse {
        id: Some(String::from("lifecycle-container")),
        network_settings: Some(NetworkSettings {
            ports: Some(ports),
            ..NetworkSettings::default()
        }),
        ..ContainerInspectResponse::default()
    }
}
