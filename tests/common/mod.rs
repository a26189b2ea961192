use axum::{http::HeaderMap, Router};
use std::net::TcpListener;

pub const TOKEN: &str = "test-token";

/// Serves `app` on a random local port and returns its base URL.
pub fn spawn_app(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let addr = listener.local_addr().unwrap();
    let server = axum::Server::from_tcp(listener)
        .expect("Failed to create server")
        .serve(app.into_make_service());
    tokio::spawn(server);
    format!("http://{}", addr)
}

pub fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|x| x.to_str().ok())
        .map_or(false, |x| x == format!("Bearer {}", TOKEN))
}
