//! HTTP hosting layer: TCP accept loop, request/response translation, and
//! graceful shutdown.
//!
//! The server is deliberately thin — it parses the wire request into a
//! [`RequestContext`], hands it to [`App::handle`], and writes the
//! [`Finalized`] response back. TLS termination is a reverse-proxy concern;
//! the secure flag is derived from `X-Forwarded-Proto`.
//!
//! On SIGTERM or Ctrl-C the listener stops accepting, every in-flight
//! connection runs to completion, and [`Server::serve`] returns. Size the
//! orchestrator's grace period (e.g. `terminationGracePeriodSeconds`)
//! longer than your slowest request.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http_body_util::{BodyExt, Full};
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::app::App;
use crate::method::Method;
use crate::request::RequestContext;
use crate::response::Finalized;

/// The HTTP server.
pub struct Server {
    addr: SocketAddr,
}

impl Server {
    /// Configures the server to bind to `addr` when [`serve`](Server::serve)
    /// is called.
    ///
    /// # Panics
    ///
    /// Panics if `addr` is not a valid `host:port` string.
    pub fn bind(addr: &str) -> Self {
        let addr: SocketAddr = addr.parse().expect("invalid socket address");
        Self { addr }
    }

    /// Finishes the app's bootstrap, then accepts connections until a full
    /// graceful shutdown.
    pub async fn serve(self, mut app: App) -> Result<(), std::io::Error> {
        app.finish().await;
        let app = Arc::new(app);

        let listener = TcpListener::bind(self.addr).await?;
        info!(addr = %self.addr, "blubber listening");

        // Track every connection task so shutdown can drain them.
        let mut tasks = tokio::task::JoinSet::new();

        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                // Check shutdown first so a signal stops accepting even
                // when connections are queued.
                biased;

                () = &mut shutdown => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                accepted = listener.accept() => {
                    let (stream, remote_addr) = match accepted {
                        Ok(pair) => pair,
                        Err(err) => {
                            error!("accept error: {err}");
                            continue;
                        }
                    };

                    let app = Arc::clone(&app);
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        // The closure runs once per request on the
                        // connection, not once per connection.
                        let svc = service_fn(move |req| {
                            let app = Arc::clone(&app);
                            async move {
                                Ok::<_, Infallible>(dispatch(app, req, remote_addr).await)
                            }
                        });

                        // Serves whichever of HTTP/1.1 and HTTP/2 the
                        // client negotiates.
                        if let Err(err) = ConnBuilder::new(TokioExecutor::new())
                            .serve_connection(io, svc)
                            .await
                        {
                            error!(peer = %remote_addr, "connection error: {err}");
                        }
                    });
                }

                // Reap finished tasks so the set does not grow unbounded.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        while tasks.join_next().await.is_some() {}

        info!("blubber stopped");
        Ok(())
    }
}

// ── Request translation ───────────────────────────────────────────────────────

/// Translates one hyper request through the app and back.
async fn dispatch(
    app: Arc<App>,
    req: hyper::Request<hyper::body::Incoming>,
    remote_addr: SocketAddr,
) -> http::Response<Full<Bytes>> {
    let (parts, body) = req.into_parts();

    let Ok(method) = Method::from_str(parts.method.as_str()) else {
        return plain_status(http::StatusCode::METHOD_NOT_ALLOWED);
    };

    let uri = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/")
        .to_owned();

    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(err) => {
            warn!("failed to read request body: {err}");
            return plain_status(http::StatusCode::BAD_REQUEST);
        }
    };

    let headers: Vec<(String, String)> = parts
        .headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_owned(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect();

    let secure = headers
        .iter()
        .any(|(name, value)| {
            name.eq_ignore_ascii_case("X-Forwarded-Proto")
                && value.eq_ignore_ascii_case("https")
        });

    let builder = RequestContext::builder(method, &uri)
        .headers(headers)
        .body(body)
        .remote_addr(remote_addr.ip().to_string())
        .secure(secure);

    let ctx = app.context(builder);
    let finalized = app.handle(ctx).await;
    into_http(finalized)
}

fn into_http(finalized: Finalized) -> http::Response<Full<Bytes>> {
    let status = http::StatusCode::from_u16(finalized.status().code())
        .unwrap_or(http::StatusCode::OK);

    let mut response = http::Response::new(Full::new(Bytes::new()));
    *response.status_mut() = status;
    for (name, value) in finalized.headers().iter() {
        match (HeaderName::try_from(name.as_str()), HeaderValue::try_from(value.as_str())) {
            (Ok(name), Ok(value)) => {
                response.headers_mut().insert(name, value);
            }
            _ => warn!(header = %name, "dropping invalid response header"),
        }
    }
    *response.body_mut() = Full::new(Bytes::from(finalized.into_body()));
    response
}

fn plain_status(status: http::StatusCode) -> http::Response<Full<Bytes>> {
    let mut response = http::Response::new(Full::new(Bytes::new()));
    *response.status_mut() = status;
    response
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first shutdown signal: SIGTERM or Ctrl-C on Unix,
/// Ctrl-C elsewhere.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let sigterm = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c  => {}
        () = sigterm => {}
    }
}
