//! Mocked container runtime shared by the harness unit tests.

use std::collections::HashMap;

use bollard::container::LogOutput;
use bollard::errors::Error as BollardError;
use bollard::models::{
    ContainerCreateBody, ContainerCreateResponse, ContainerInspectResponse, NetworkSettings,
    PortBinding,
};
use bollard::query_parameters::CreateContainerOptions;
use futures_util::stream;
use mockall::mock;

use crate::engine::{ContainerRuntime, EngineFuture, LogStream};

mock! {
    pub Runtime {}

    impl ContainerRuntime for Runtime {
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

pub const CONTAINER_ID: &str = "c0ffee";

pub fn server_error(status_code: u16, message: &str) -> BollardError {
    BollardError::DockerResponseServerError {
        status_code,
        message: String::from(message),
    }
}

pub fn log_lines(lines: &[&str]) -> LogStream {
    let items: Vec<Result<LogOutput, BollardError>> = lines
        .iter()
        .map(|line| {
            Ok(LogOutput::StdErr {
                message: Vec::from(format!("{line}\n")).into(),
            })
        })
        .collect();
    Box::pin(stream::iter(items))
}

/// Inspect response publishing each `(internal, host port)` pair on both
/// address families, IPv6 first.
pub fn inspect_with_ports(bindings: &[(&str, &str)]) -> ContainerInspectResponse {
    let ports = bindings
        .iter()
        .map(|(internal, host_port)| {
            let published = vec![
                PortBinding {
                    host_ip: Some(String::from("::")),
                    host_port: Some(String::from(*host_port)),
                },
                PortBinding {
                    host_ip: Some(String::from("0.0.0.0")),
                    host_port: Some(String::from(*host_port)),
                },
            ];
            (String::from(*internal), Some(published))
        })
        .collect::<HashMap<_, _>>();

    ContainerInspectResponse {
        id: Some(String::from(CONTAINER_ID)),
        network_settings: Some(NetworkSettings {
            ports: Some(ports),
            ..NetworkSettings::default()
        }),
        ..ContainerInspectResponse::default()
    }
}

pub fn expect_logs(runtime: &mut MockRuntime, lines: &'static [&'static str]) {
    runtime
        .expect_container_logs()
        .times(1)
        .returning(move |_| log_lines(lines));
}

pub fn expect_inspect(runtime: &mut MockRuntime, bindings: &'static [(&'static str, &'static str)]) {
    runtime
        .expect_inspect_container()
        .times(1)
        .returning(move |_| {
            let response = inspect_with_ports(bindings);
            Box::pin(async move { Ok(response) })
        });
}

pub fn expect_removal(runtime: &mut MockRuntime, times: usize) {
    runtime
        .expect_remove_container()
        .times(times)
        .returning(|_| Box::pin(async { Ok(()) }));
}

pub fn current_thread_runtime() -> std::io::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
}
