//! Shared integration-test server bootstrap helpers.

#![allow(dead_code)]

use axum_test::TestServer;
use pastebin_core::kv::{KvClient, MemoryStore};
use pastebin_core::test_support::{manual_clock, FaultyStore};
use pastebin_core::ManualClock;
use pastebin_server::{create_app, AppState, Config};
use std::sync::Arc;
use std::time::Duration;

pub(crate) const BASE_URL: &str = "http://paste.test";

pub(crate) struct TestApp {
    pub server: TestServer,
    pub clock: Arc<ManualClock>,
    pub store: Arc<MemoryStore>,
    pub faulty: Arc<FaultyStore>,
}

pub(crate) fn test_config() -> Config {
    Config {
        base_url: BASE_URL.to_string(),
        rate_limit_max_requests: 10_000,
        purge_interval_secs: 0,
        health_timeout: Duration::from_millis(200),
        ..Config::default()
    }
}

pub(crate) fn test_app_for_config(config: Config) -> TestApp {
    let clock = manual_clock();
    let store = Arc::new(MemoryStore::new(clock.clone()));
    let faulty = Arc::new(FaultyStore::new(store.clone()));
    let kv = Arc::new(KvClient::from_store(faulty.clone(), config.store_timeout));
    let state = AppState::new(config, kv, clock.clone());
    let server = TestServer::new(create_app(state)).expect("server");
    TestApp {
        server,
        clock,
        store,
        faulty,
    }
}

pub(crate) fn setup_test_app() -> TestApp {
    test_app_for_config(test_config())
}
