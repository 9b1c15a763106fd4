//! Shared helpers for integration tests.

pub mod mock_ws;

use qtrader_app::AppConfig;

/// Config pointed at `page_origin` with short timings and a fixed seed.
pub fn fast_config(page_origin: String) -> AppConfig {
    let mut config = AppConfig::default();
    config.transport.page_origin = page_origin;
    config.transport.retry_delay_ms = 20;
    config.transport.connect_timeout_ms = 500;
    config.synthetic.price_interval_ms = 20;
    config.synthetic.signal_interval_ms = 60;
    config.rng_seed = Some(11);
    config
}

/// A localhost port with nothing listening on it.
pub async fn closed_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}
