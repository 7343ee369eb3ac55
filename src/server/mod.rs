//! Worker pool / accept loop (component 4.L) plus the admin HTTP surface.
//!
//! Every bound listener gets its own lightweight accept task feeding a
//! single mpsc channel; the channel's FIFO ordering gives "whichever
//! listener had a client ready first" fairness across listeners without a
//! hand-rolled `select_all`/`poll` loop. `max_clients` is a counting
//! semaphore rather than a connection-count check-then-increment, so it
//! can't race two simultaneous accepts past the cap.

mod admin;
pub mod bootstrap;
pub mod runtime;
mod state;

pub use state::{new_state, ProxyState};

use crate::net;
use crate::proxy;
use anyhow::{Context, Result};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Semaphore};
use tracing::{error, info, warn};

const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Run the accept loop over already-bound `listeners` until
/// `state.should_quit()`. Listeners are bound ahead of time (see
/// [`bind_all`]) so the caller can drop root privileges in between binding
/// and serving.
pub async fn run_proxy_server(state: Arc<ProxyState>, listeners: Vec<TcpListener>) -> Result<()> {
    if listeners.is_empty() {
        anyhow::bail!("no listeners bound");
    }
    for l in &listeners {
        info!(addr = %l.local_addr()?, "proxy listening");
    }

    let (tx, mut rx) = mpsc::channel::<(TcpStream, SocketAddr)>(256);
    for listener in listeners {
        let tx = tx.clone();
        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        if tx.send((stream, addr)).await.is_err() {
                            return;
                        }
                    }
                    Err(e) => error!("accept failed: {e}"),
                }
            }
        });
    }
    drop(tx);

    let max_clients = state.config().max_clients.max(1) as usize;
    let permits = Arc::new(Semaphore::new(max_clients));
    let active = Arc::new(AtomicI64::new(0));
    let mut refusing = false;

    loop {
        if state.should_quit() {
            break;
        }

        let (stream, peer_addr) = tokio::select! {
            biased;
            accepted = rx.recv() => match accepted {
                Some(v) => v,
                None => break,
            },
            _ = tokio::time::sleep(ACCEPT_POLL_INTERVAL) => continue,
        };

        state.reload_if_requested().await;

        let permit = match permits.clone().try_acquire_owned() {
            Ok(p) => {
                refusing = false;
                p
            }
            Err(_) => {
                state.stats.inc_refused();
                if !refusing {
                    warn!("Maximum connections reached, refusing further clients");
                    refusing = true;
                }
                drop(stream);
                continue;
            }
        };

        active.fetch_add(1, Ordering::Relaxed);
        let worker_state = state.clone();
        let worker_active = active.clone();
        tokio::spawn(async move {
            proxy::handle_connection(stream, peer_addr, worker_state).await;
            worker_active.fetch_sub(1, Ordering::Relaxed);
            drop(permit);
        });
    }

    info!("shutdown requested, draining in-flight connections");
    let drain = async {
        while active.load(Ordering::Relaxed) > 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    };
    if tokio::time::timeout(DRAIN_TIMEOUT, drain).await.is_err() {
        warn!(
            remaining = active.load(Ordering::Relaxed),
            "drain timeout elapsed, dropping remaining connections"
        );
    }

    Ok(())
}

/// Bind every listener the configuration calls for (wildcard per family,
/// a single numeric address, or every address on a named interface).
pub fn bind_all(config: &crate::config::Config) -> Result<Vec<TcpListener>> {
    if config.listen_addrs.is_empty() {
        net::listen_sock(None, config.port).context("binding default listener")
    } else {
        let mut out = Vec::new();
        for addr in &config.listen_addrs {
            out.extend(net::listen_sock(Some(addr), config.port).context("binding listener")?);
        }
        Ok(out)
    }
}

/// Bind the admin listener ahead of privilege drop, same reasoning as
/// [`bind_all`].
pub async fn bind_admin(listen: &str) -> Result<TcpListener> {
    let addr: SocketAddr = listen.parse().context("parsing admin listen address")?;
    TcpListener::bind(addr).await.context("binding admin listener")
}

/// Admin HTTP surface (`/healthz`, `/metrics`, `/stats`) — served on its own
/// pre-bound listener, the way the teacher keeps admin traffic off the data
/// path.
pub async fn run_admin_server(listener: TcpListener, state: Arc<ProxyState>) -> Result<()> {
    info!(addr = %listener.local_addr()?, "admin listening");

    loop {
        let (stream, _) = listener.accept().await?;
        let state = state.clone();

        tokio::spawn(async move {
            let io = TokioIo::new(stream);
            let svc = service_fn(move |req: Request<Incoming>| {
                let state = state.clone();
                async move { admin::handle_admin(req, state) }
            });

            if let Err(e) = auto::Builder::new(TokioExecutor::new())
                .http1()
                .keep_alive(true)
                .serve_connection_with_upgrades(io, svc)
                .await
            {
                if !e.to_string().contains("connection closed") {
                    error!("admin: connection error: {e}");
                }
            }
        });
    }
}
