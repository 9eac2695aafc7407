//! Skips socket-bound tests on hosts that cannot bind localhost.
//!
//! Set `LAUNCHER_FETCH_REQUIRE_SOCKET_TESTS=1` to fail instead of skipping.

use tokio::net::TcpListener;
use wiremock::MockServer;

fn skip_or_fail() {
    let required = std::env::var("LAUNCHER_FETCH_REQUIRE_SOCKET_TESTS")
        .is_ok_and(|value| matches!(value.as_str(), "1" | "true"));
    assert!(!required, "cannot bind a localhost socket");
    eprintln!("[socket-bound-test] cannot bind a localhost socket; skipping");
}

/// Starts a mock server, or returns `None` when localhost sockets are unavailable.
pub async fn start_mock_server_or_skip() -> Option<MockServer> {
    if std::net::TcpListener::bind("127.0.0.1:0").is_err() {
        skip_or_fail();
        return None;
    }
    Some(MockServer::start().await)
}

/// Binds a raw listener on an ephemeral localhost port.
#[allow(dead_code)]
pub async fn bind_localhost_or_skip() -> Option<TcpListener> {
    if let Ok(listener) = TcpListener::bind("127.0.0.1:0").await {
        Some(listener)
    } else {
        skip_or_fail();
        None
    }
}
