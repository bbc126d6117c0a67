//! HTTP listener with cooperative shutdown.

use std::time::Duration;

use axum::Router;
use axum::http::Request;
use jetfeed_core::ShutdownHandle;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::Level;

use crate::routes::router;
use crate::state::AppState;

/// The router with request tracing and CORS.
pub fn app(state: AppState) -> Router {
    router(state)
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                tracing::span!(
                    Level::INFO,
                    "http_request",
                    method = %request.method(),
                    path = %request.uri().path(),
                    query = request.uri().query().unwrap_or("")
                )
            }),
        )
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

/// Bind `bind_addr` and serve until `shutdown` fires.
pub async fn serve(
    state: AppState,
    bind_addr: &str,
    shutdown: ShutdownHandle,
    grace: Duration,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(bind_addr).await?;
    serve_on(listener, state, shutdown, grace).await
}

/// Serve on an already bound listener.
///
/// When `shutdown` fires the listener stops accepting and in-flight requests
/// get `grace` to finish before they are dropped.
pub async fn serve_on(
    listener: TcpListener,
    state: AppState,
    shutdown: ShutdownHandle,
    grace: Duration,
) -> std::io::Result<()> {
    tracing::info!(addr = %listener.local_addr()?, "feed server listening");

    let drain = shutdown.clone();
    let server = axum::serve(listener, app(state))
        .with_graceful_shutdown(async move {
            drain.wait().await;
        });
    let mut task = tokio::spawn(async move { server.await });

    tokio::select! {
        result = &mut task => return result.map_err(std::io::Error::other)?,
        _ = shutdown.wait() => {}
    }

    match tokio::time::timeout(grace, &mut task).await {
        Ok(result) => {
            result.map_err(std::io::Error::other)??;
            tracing::info!("feed server stopped");
            Ok(())
        }
        Err(_) => {
            tracing::warn!(grace = ?grace, "grace period elapsed, dropping in-flight requests");
            task.abort();
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Config;
    use jetfeed_core::MatchStore;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn state(tmp: &TempDir) -> AppState {
        let store = Arc::new(MatchStore::open(tmp.path()).unwrap());
        AppState::new(
            Config {
                bind_addr: "127.0.0.1:0".to_string(),
                feed_actor_did: "did:plc:publisher".to_string(),
                service_did: "did:web:feeds.example.com".to_string(),
                feeds: vec!["english-text".to_string()],
                shutdown_grace: Duration::from_secs(1),
            },
            store,
        )
    }

    #[tokio::test]
    async fn test_serves_then_stops_on_shutdown() {
        let tmp = TempDir::new().unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = ShutdownHandle::new();

        let server = tokio::spawn(serve_on(
            listener,
            state(&tmp),
            shutdown.clone(),
            Duration::from_secs(1),
        ));

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains(r#""status":"ok""#));

        shutdown.shutdown();
        tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}
