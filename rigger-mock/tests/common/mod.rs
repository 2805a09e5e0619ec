//! Shared test utilities for rigger-mock integration tests.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use rigger_core::{HttpControlPlane, ReconcileAuditLogger};
use rigger_mock::{AppState, create_router};
use tokio::net::TcpListener;

/// Mock control plane served on an OS-assigned port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub state: Arc<AppState>,
    shutdown_tx: tokio::sync::oneshot::Sender<()>,
}

impl TestServer {
    pub async fn spawn(token: Option<&str>) -> Self {
        let state = Arc::new(AppState::new(
            token.map(str::to_string),
            Arc::new(ReconcileAuditLogger::new_noop()),
        ));
        let router = create_router(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        Self {
            addr,
            state,
            shutdown_tx,
        }
    }

    pub fn endpoint(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn client(&self, token: Option<&str>) -> HttpControlPlane {
        HttpControlPlane::new(
            &self.endpoint(),
            token.map(str::to_string),
            Duration::from_secs(5),
        )
        .expect("Failed to build client")
    }

    pub fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
    }
}
