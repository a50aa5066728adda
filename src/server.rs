//! HTTP server and graceful shutdown.
//!
//! The server is a thin adapter: it turns each hyper request into a
//! [`RawInput`], hands it to [`App::dispatch`], and writes back whatever
//! comes out. All routing, validation and error mapping happen in the app.
//!
//! # Graceful shutdown and Kubernetes
//!
//! When Kubernetes terminates a pod it sends **SIGTERM** and waits
//! `terminationGracePeriodSeconds` (default 30 s) before sending SIGKILL.
//!
//! The server reacts by:
//! 1. Immediately stopping `listener.accept()`, so no new connections are made.
//! 2. Letting every in-flight connection task run to completion.
//! 3. Returning from [`Server::serve`], which lets `main` exit cleanly.
//!
//! [`Server::spawn`] gives the same loop a programmatic stop instead:
//! [`ServerHandle::close`].
//!
//! # Cancellation
//!
//! When a client goes away hyper drops the connection's request future. The
//! middleware or handler future inside it is dropped with it and stops at
//! its next `.await`.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use serde_json::{Map, Value};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::engine::App;
use crate::error::{Error, RequestError};
use crate::method::Method;
use crate::normalize::RawInput;

/// The HTTP server.
pub struct Server {
    addr: SocketAddr,
}

impl Server {
    /// Configures the server to bind to `addr` (a `host:port` string).
    ///
    /// ```rust
    /// use waypost::Server;
    /// assert!(Server::bind("0.0.0.0:3000").is_ok());
    /// assert!(Server::bind("nowhere").is_err());
    /// ```
    pub fn bind(addr: &str) -> Result<Self, Error> {
        let addr = addr.parse().map_err(|_| Error::InvalidAddress(addr.to_owned()))?;
        Ok(Self { addr })
    }

    /// Serves `app` until SIGTERM or Ctrl-C, then drains in-flight requests.
    pub async fn serve(self, app: App) -> Result<(), Error> {
        self.serve_with_shutdown(app, shutdown_signal()).await
    }

    /// Serves `app` until `signal` resolves, then drains in-flight requests.
    pub async fn serve_with_shutdown(
        self,
        app: App,
        signal: impl Future<Output = ()> + Send,
    ) -> Result<(), Error> {
        let listener = TcpListener::bind(self.addr).await?;
        run(listener, Arc::new(app), signal).await;
        Ok(())
    }

    /// Binds now and serves in a background task.
    ///
    /// Binding port `0` picks a free port; read it back with
    /// [`ServerHandle::local_addr`].
    pub async fn spawn(self, app: App) -> Result<ServerHandle, Error> {
        let listener = TcpListener::bind(self.addr).await?;
        let addr = listener.local_addr()?;
        let (stop, stopped) = oneshot::channel::<()>();
        let task = tokio::spawn(run(listener, Arc::new(app), async move {
            // a dropped handle stops the server as well
            let _ = stopped.await;
        }));
        Ok(ServerHandle { addr, stop, task })
    }
}

/// A running server started with [`Server::spawn`].
pub struct ServerHandle {
    addr: SocketAddr,
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stops accepting connections and waits for in-flight ones to finish.
    pub async fn close(self) -> Result<(), Error> {
        let _ = self.stop.send(());
        self.task.await.map_err(|e| Error::Io(std::io::Error::other(e)))
    }
}

async fn run(listener: TcpListener, app: Arc<App>, signal: impl Future<Output = ()>) {
    match listener.local_addr() {
        Ok(addr) => info!(%addr, "waypost listening"),
        Err(e) => error!("listener has no local address: {e}"),
    }

    // JoinSet tracks every spawned connection task so we can wait for
    // them all to finish during graceful shutdown.
    let mut tasks = tokio::task::JoinSet::new();

    tokio::pin!(signal);

    loop {
        tokio::select! {
            // Check shutdown first so a stop request wins over queued
            // connections.
            biased;

            () = &mut signal => {
                info!(in_flight = tasks.len(), "shutdown requested, draining connections");
                break;
            }

            res = listener.accept() => {
                let (stream, remote_addr) = match res {
                    Ok(v) => v,
                    Err(e) => {
                        error!("accept error: {e}");
                        continue;
                    }
                };

                let app = Arc::clone(&app);
                let io = TokioIo::new(stream);

                tasks.spawn(async move {
                    // Called once per request on the connection.
                    let svc = service_fn(move |req| {
                        let app = Arc::clone(&app);
                        async move { dispatch(app, req).await }
                    });

                    // HTTP/1.1 and HTTP/2, whichever the client speaks.
                    if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                        .serve_connection(io, svc)
                        .await
                    {
                        error!(peer = %remote_addr, "connection error: {e}");
                    }
                });
            }

            // Reap finished connection tasks so the JoinSet does not grow
            // without bound on long-running servers.
            Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
        }
    }

    while tasks.join_next().await.is_some() {}

    info!("waypost stopped");
}

// ── Request conversion ────────────────────────────────────────────────────────

/// Converts one hyper request and dispatches it. Every failure is already a
/// response by the time it gets here, so hyper never sees an error.
async fn dispatch(
    app: Arc<App>,
    req: hyper::Request<Incoming>,
) -> Result<http::Response<Full<Bytes>>, Infallible> {
    let path = req.uri().path().to_owned();

    let Some(method) = Method::from_http(req.method()) else {
        let failure = RequestError::domain(StatusCode::METHOD_NOT_ALLOWED, "");
        return Ok(app.reject(&failure, &path).into_inner());
    };

    let response = match read_input(req).await {
        Ok(raw) => app.dispatch(method, &path, raw).await,
        Err(failure) => app.reject(&failure, &path),
    };
    Ok(response.into_inner())
}

async fn read_input(req: hyper::Request<Incoming>) -> Result<RawInput, RequestError> {
    let (parts, body) = req.into_parts();

    let mut headers = Map::new();
    for (name, value) in &parts.headers {
        if let Ok(value) = value.to_str() {
            headers.entry(name.as_str()).or_insert_with(|| Value::String(value.to_owned()));
        }
    }

    let query = parts.uri.query().map(decode_form).unwrap_or_default();

    let bytes = body.collect().await?.to_bytes();
    let content_type = headers.get("content-type").and_then(Value::as_str).unwrap_or("");
    let body = decode_body(content_type, &bytes)?;

    Ok(RawInput { headers, params: Map::new(), query, body })
}

fn decode_body(content_type: &str, bytes: &[u8]) -> Result<Value, RequestError> {
    if bytes.is_empty() {
        return Ok(Value::Object(Map::new()));
    }
    let mime = content_type.split(';').next().unwrap_or("").trim();
    if mime.eq_ignore_ascii_case("application/json") {
        serde_json::from_slice(bytes)
            .map_err(|e| RequestError::domain(StatusCode::BAD_REQUEST, format!("malformed JSON body: {e}")))
    } else if mime.eq_ignore_ascii_case("application/x-www-form-urlencoded") {
        Ok(Value::Object(decode_form(&String::from_utf8_lossy(bytes))))
    } else {
        Ok(Value::String(String::from_utf8_lossy(bytes).into_owned()))
    }
}

/// Decodes `a=1&b=2`. The first occurrence of a key wins.
fn decode_form(raw: &str) -> Map<String, Value> {
    let mut out = Map::new();
    for (key, value) in url::form_urlencoded::parse(raw.as_bytes()) {
        out.entry(key.into_owned()).or_insert_with(|| Value::String(value.into_owned()));
    }
    out
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first shutdown signal the process receives.
///
/// On Unix this listens for both **SIGTERM** (sent by `kubectl` and the
/// Kubernetes control plane) and **SIGINT** (Ctrl-C, for local dev).
/// On Windows only Ctrl-C is available. A handler that cannot be installed
/// is logged and that arm never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    // `pending()` is a future that never resolves, so on non-Unix platforms
    // the SIGTERM arm is effectively disabled.
    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn form_bodies_keep_bracket_keys_for_the_normalizer() {
        let body = decode_body("application/x-www-form-urlencoded", b"user%5Bname%5D=Ana&x=1&x=2").unwrap();
        assert_eq!(body, json!({"user[name]": "Ana", "x": "1"}));
    }

    #[test]
    fn json_bodies_parse_and_reject_garbage() {
        let ok = decode_body("application/json; charset=utf-8", br#"{"a":1}"#).unwrap();
        assert_eq!(ok, json!({"a": 1}));

        let err = decode_body("application/json", b"{nope").unwrap_err();
        assert!(matches!(err, RequestError::Domain { status: StatusCode::BAD_REQUEST, .. }));
    }

    #[test]
    fn empty_and_opaque_bodies() {
        assert_eq!(decode_body("", b"").unwrap(), json!({}));
        assert_eq!(decode_body("text/plain", b"hi").unwrap(), json!("hi"));
    }
}
