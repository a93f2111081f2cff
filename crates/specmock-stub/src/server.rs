//! The stub HTTP server: one listener serving stubs and the admin API.

use crate::engine::StubEngine;
use crate::error::ServerError;
use crate::handler::handle_request;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

pub struct StubServer {
    listener: TcpListener,
    engine: Arc<StubEngine>,
}

impl StubServer {
    /// Bind the listener. Port `0` picks a free port; see [`Self::local_addr`].
    pub async fn bind(addr: &str, engine: Arc<StubEngine>) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr).await.map_err(|source| ServerError::Bind {
            addr: addr.to_string(),
            source,
        })?;
        Ok(Self { listener, engine })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener.local_addr().map_err(ServerError::LocalAddr)
    }

    pub fn engine(&self) -> &Arc<StubEngine> {
        &self.engine
    }

    /// Serve until the process exits.
    pub async fn run(self) {
        self.run_until(std::future::pending::<()>()).await
    }

    /// Serve until `shutdown` completes. In-flight connections finish on
    /// their own tasks.
    pub async fn run_until(self, shutdown: impl Future<Output = ()>) {
        if let Ok(addr) = self.local_addr() {
            info!("Specmock stub server listening on http://{}", addr);
        }
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, remote) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            error!("Failed to accept connection: {}", e);
                            continue;
                        }
                    };
                    let io = TokioIo::new(stream);
                    let engine = Arc::clone(&self.engine);

                    tokio::spawn(async move {
                        let service = service_fn(move |req| {
                            let engine = Arc::clone(&engine);
                            async move { handle_request(req, engine).await }
                        });

                        if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                            debug!("Connection error from {}: {}", remote, e);
                        }
                    });
                }
                _ = &mut shutdown => {
                    info!("Specmock stub server shutting down");
                    break;
                }
            }
        }
    }
}
