//! Health probing

use super::state::CrashCause;
use crate::runtime::{Liveness, Runtime};
use crate::service::HealthCheck;
use std::time::Duration;
use tokio::net::TcpStream;

/// Connect timeout for TCP probes
const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Result of one probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    Healthy,
    Unhealthy(String),
    Exited(i32),
}

/// Probe a container once
pub async fn probe(runtime: &dyn Runtime, container: &str, check: &HealthCheck) -> Probe {
    match runtime.status(container).await {
        Ok(Liveness::Running) => {}
        Ok(Liveness::Exited(code)) => return Probe::Exited(code),
        Ok(Liveness::Missing) => {
            return Probe::Unhealthy(format!("container {} not found", container))
        }
        Err(e) => return Probe::Unhealthy(e.to_string()),
    }

    match check {
        HealthCheck::ProcessAlive => Probe::Healthy,
        HealthCheck::TcpPort(port) => {
            match tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(("127.0.0.1", *port)))
                .await
            {
                Ok(Ok(_)) => Probe::Healthy,
                Ok(Err(e)) => Probe::Unhealthy(format!("port {}: {}", port, e)),
                Err(_) => Probe::Unhealthy(format!("port {}: connect timed out", port)),
            }
        }
        HealthCheck::Command(command) => match runtime.exec(container, command).await {
            Ok(0) => Probe::Healthy,
            Ok(code) => Probe::Unhealthy(format!("health command exited with {}", code)),
            Err(e) => Probe::Unhealthy(e.to_string()),
        },
    }
}

/// Probe until the container is healthy. Fails as soon as the process exits;
/// callers bound the wait with a timeout.
pub async fn wait_until_healthy(
    runtime: &dyn Runtime,
    container: &str,
    check: &HealthCheck,
    interval: Duration,
) -> std::result::Result<(), CrashCause> {
    loop {
        match probe(runtime, container, check).await {
            Probe::Healthy => return Ok(()),
            Probe::Exited(code) => return Err(CrashCause::Exited(code)),
            Probe::Unhealthy(reason) => {
                tracing::debug!("{} not healthy yet: {}", container, reason);
            }
        }
        tokio::time::sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{ContainerManager, ContainerSpec};
    use crate::service::ServiceDefinition;
    use tempfile::tempdir;
    use tokio::net::TcpListener;

    async fn running(runtime: &ContainerManager, name: &str) -> String {
        let spec = ContainerSpec::from_service("test", &ServiceDefinition::new(name, "image"));
        runtime.launch(&spec).await.unwrap();
        spec.name
    }

    #[tokio::test]
    async fn test_process_alive() {
        let temp = tempdir().unwrap();
        let runtime = ContainerManager::new(temp.path().to_path_buf()).unwrap();
        let container = running(&runtime, "db").await;

        assert_eq!(
            probe(&runtime, &container, &HealthCheck::ProcessAlive).await,
            Probe::Healthy
        );

        runtime.exit(&container, 3).unwrap();
        assert_eq!(
            probe(&runtime, &container, &HealthCheck::ProcessAlive).await,
            Probe::Exited(3)
        );
    }

    #[tokio::test]
    async fn test_missing_container_is_unhealthy() {
        let temp = tempdir().unwrap();
        let runtime = ContainerManager::new(temp.path().to_path_buf()).unwrap();

        assert!(matches!(
            probe(&runtime, "nothing", &HealthCheck::ProcessAlive).await,
            Probe::Unhealthy(_)
        ));
    }

    #[tokio::test]
    async fn test_tcp_port() {
        let temp = tempdir().unwrap();
        let runtime = ContainerManager::new(temp.path().to_path_buf()).unwrap();
        let container = running(&runtime, "web").await;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        assert_eq!(
            probe(&runtime, &container, &HealthCheck::TcpPort(port)).await,
            Probe::Healthy
        );

        drop(listener);
        assert!(matches!(
            probe(&runtime, &container, &HealthCheck::TcpPort(port)).await,
            Probe::Unhealthy(_)
        ));
    }

    #[tokio::test]
    async fn test_health_command() {
        let temp = tempdir().unwrap();
        let runtime = ContainerManager::new(temp.path().to_path_buf()).unwrap();
        let container = running(&runtime, "queue").await;
        let check = HealthCheck::Command(vec!["rabbitmq-diagnostics".into(), "ping".into()]);

        runtime.set_unhealthy(&container, true).unwrap();
        assert!(matches!(
            probe(&runtime, &container, &check).await,
            Probe::Unhealthy(_)
        ));

        runtime.set_unhealthy(&container, false).unwrap();
        assert_eq!(probe(&runtime, &container, &check).await, Probe::Healthy);
    }

    #[tokio::test]
    async fn test_wait_fails_fast_on_exit() {
        let temp = tempdir().unwrap();
        let runtime = ContainerManager::new(temp.path().to_path_buf()).unwrap();
        let container = running(&runtime, "workers").await;
        runtime.exit(&container, 1).unwrap();

        let result = wait_until_healthy(
            &runtime,
            &container,
            &HealthCheck::ProcessAlive,
            Duration::from_millis(10),
        )
        .await;
        assert_eq!(result, Err(CrashCause::Exited(1)));
    }
}
