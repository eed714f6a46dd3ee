// tests/common/mod.rs

#![allow(dead_code)]

use comment_threads::{
    config::Config, models::comment::DeleteMode, routes, state::AppState, store::MemoryStore,
};
use std::sync::Arc;

pub fn test_config(delete_mode: DeleteMode) -> Config {
    Config {
        database_url: "postgres://unused".to_string(),
        rust_log: "error".to_string(),
        bind_addr: "127.0.0.1:0".to_string(),
        log_dir: "logs".to_string(),
        max_connections: 1,
        acquire_timeout_secs: 1,
        statement_timeout_ms: 1000,
        request_timeout_secs: 10,
        comment_delete_mode: delete_mode,
        task_max_attempts: 3,
    }
}

pub struct TestApp {
    /// Base URL, e.g. "http://127.0.0.1:12345".
    pub address: String,
    pub store: Arc<MemoryStore>,
    pub state: AppState,
}

/// State over a fresh in-memory store, with the side-effect worker running.
pub fn test_state(delete_mode: DeleteMode) -> (AppState, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let state = AppState::start(store.clone(), test_config(delete_mode));
    (state, store)
}

/// Spawns the app on a random port.
pub async fn spawn_app() -> TestApp {
    spawn_app_with(DeleteMode::Tombstone).await
}

pub async fn spawn_app_with(delete_mode: DeleteMode) -> TestApp {
    let (state, store) = test_state(delete_mode);
    let app = routes::create_router(state.clone());

    // Bind to port 0 to get a random available port
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");

    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp {
        address,
        store,
        state,
    }
}

/// Polls `check` until it returns true or two seconds pass.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    false
}
