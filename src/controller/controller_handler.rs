use crate::configuration::config::Config;
use crate::engine::{Engine, Janitor};
use crate::error_handling::types::*;
use crate::web_interface::WebServer;
use log::{error, info};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Wires the engine to its background tasks: the janitor and, when enabled, the dashboard.
pub struct Controller {
    pub config: Config,
    engine: Arc<Engine>,
}

impl Controller {
    pub fn new(config: Config) -> Result<Self, ControllerError> {
        info!("Creating controller");
        config.validate().map_err(|err| {
            error!("Invalid configuration: {}", err);
            ControllerError::ConfigurationError(err)
        })?;

        let engine = Arc::new(Engine::new(config.clone()));
        Ok(Self { config, engine })
    }

    pub fn engine(&self) -> Arc<Engine> {
        self.engine.clone()
    }

    /// Runs until Ctrl-C.
    pub async fn run(&mut self) -> Result<(), ControllerError> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Unable to listen for Ctrl-C: {}", e);
            }
        })
        .await
    }

    /// Runs until `shutdown` resolves or the dashboard fails.
    pub async fn run_until(
        &mut self,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), ControllerError> {
        info!("Starting controller");

        let janitor = Janitor::spawn(
            self.engine.clone(),
            Duration::from_secs(self.config.janitor.sweep_interval_secs),
            Duration::from_secs(self.config.metrics.interval_secs),
        )
        .map_err(|e| ControllerError::InitializationFailed(e.to_string()))?;

        let (web_stop_tx, web_stop_rx) = oneshot::channel::<()>();
        let mut web = self.spawn_web(web_stop_rx);
        let mut web_finished = false;

        let outcome = match web.as_mut() {
            Some(handle) => tokio::select! {
                _ = shutdown => Ok(()),
                joined = handle => {
                    web_finished = true;
                    match joined {
                        Ok(result) => result.map_err(ControllerError::from),
                        Err(e) => Err(ControllerError::InitializationFailed(format!(
                            "dashboard task failed: {}",
                            e
                        ))),
                    }
                }
            },
            None => {
                shutdown.await;
                Ok(())
            }
        };

        if web_finished {
            web = None;
        }
        self.shutdown(janitor, web_stop_tx, web).await;
        outcome
    }

    fn spawn_web(
        &self,
        stop: oneshot::Receiver<()>,
    ) -> Option<JoinHandle<Result<(), WebError>>> {
        if !self.config.web.enabled {
            info!("Dashboard disabled");
            return None;
        }

        let addr = SocketAddr::new(self.config.web.bind_address, self.config.web.port);
        let server = WebServer::new(self.engine.clone());
        Some(tokio::spawn(async move {
            server
                .start(addr, async {
                    let _ = stop.await;
                })
                .await
        }))
    }

    async fn shutdown(
        &self,
        janitor: Janitor,
        web_stop: oneshot::Sender<()>,
        web: Option<JoinHandle<Result<(), WebError>>>,
    ) {
        info!("Shutting down");

        let _ = web_stop.send(());
        if let Some(handle) = web {
            if let Err(e) = handle.await {
                error!("Dashboard task ended abnormally: {}", e);
            }
        }

        if let Err(e) = janitor.shutdown().await {
            error!("Janitor task ended abnormally: {}", e);
        }

        info!("Shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn headless_config() -> Config {
        let mut config = Config::default();
        config.web.enabled = false;
        config
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let mut config = Config::default();
        config.login.max_failures = 0;

        assert!(matches!(
            Controller::new(config),
            Err(ControllerError::ConfigurationError(_))
        ));
    }

    #[tokio::test]
    async fn test_run_until_shutdown() {
        let mut controller = Controller::new(headless_config()).unwrap();
        let engine = controller.engine();
        let ip = "203.0.113.45".parse().unwrap();

        tokio_test::assert_ok!(
            controller
                .run_until(async move {
                    engine.on_login_attempt(ip, false);
                })
                .await
        );
        assert_eq!(controller.engine().login_guard().failed_attempts(ip), 1);
    }

    #[tokio::test]
    async fn test_run_refuses_zero_metrics_period() {
        let mut controller = Controller::new(headless_config()).unwrap();
        controller.config.metrics.interval_secs = 0;

        let result = controller.run_until(async {}).await;

        assert!(matches!(result, Err(ControllerError::InitializationFailed(_))));
    }

    #[tokio::test]
    async fn test_run_reports_dashboard_bind_failure() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut config = Config::default();
        config.web.port = taken.local_addr().unwrap().port();
        let mut controller = Controller::new(config).unwrap();

        let result = controller.run_until(std::future::pending()).await;

        assert!(matches!(result, Err(ControllerError::WebError(_))));
    }
}
