use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use log::info;
use tokio::net::TcpListener;

use super::routes::routes;
use crate::engine::Engine;
use crate::error_handling::types::WebError;

/// Web server for the JSON dashboard and the unban/unblock actions
pub struct WebServer {
    engine: Arc<Engine>,
}

impl WebServer {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    /// Serves the dashboard on `addr` until `shutdown` resolves.
    ///
    /// The address is bound once up front so an unavailable port is reported as
    /// [`WebError::BindFailed`] instead of a panic inside warp.
    pub async fn start(
        &self,
        addr: SocketAddr,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), WebError> {
        let bound = TcpListener::bind(addr)
            .await
            .map_err(|e| WebError::BindFailed(format!("{}: {}", addr, e)))?;
        drop(bound);

        info!("Dashboard listening on http://{}", addr);

        tokio::select! {
            _ = warp::serve(routes(self.engine.clone())).run(addr) => {}
            _ = shutdown => info!("Dashboard shutting down"),
        }

        Ok(())
    }
}
