//! HTTP/1 accept loop for the upload page.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use anyhow::{Context, Result};
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use super::{handle_request, AppState};
use crate::errors::error_logging;

/// Bind the configured address and start serving
pub async fn start_web_server(state: AppState) -> Result<(SocketAddr, JoinHandle<()>)> {
    let ip: IpAddr = state
        .config
        .server
        .bind_address
        .parse()
        .context("Invalid bind address")?;
    let addr = SocketAddr::new(ip, state.config.server.port);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind web server on {}", addr))?;
    let local_addr = listener.local_addr()?;
    tracing::info!("Web server listening on http://{}", local_addr);

    Ok((local_addr, spawn_web_server(listener, state)))
}

/// Serve connections from an already bound listener, one task per connection
pub fn spawn_web_server(listener: TcpListener, state: AppState) -> JoinHandle<()> {
    let state = Arc::new(state);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let state = state.clone();

                    tokio::spawn(async move {
                        let io = TokioIo::new(stream);

                        let service = hyper::service::service_fn(
                            move |req: hyper::Request<hyper::body::Incoming>| {
                                handle_request(req, state.clone())
                            },
                        );

                        if let Err(err) = http1::Builder::new().serve_connection(io, service).await
                        {
                            error_logging::log_network_error(
                                &err,
                                "serve_web_connection",
                                Some(&peer.to_string()),
                            );
                        }
                    });
                }
                Err(e) => {
                    error_logging::log_network_error(&e, "accept_web_connection", None);
                }
            }
        }
    })
}
