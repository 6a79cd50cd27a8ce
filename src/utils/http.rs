use once_cell::sync::Lazy;
use reqwest::Client;
use std::time::Duration;

use crate::config::CONFIG;

static HTTP_CLIENT: Lazy<Client> =
    Lazy::new(|| build_http_client(CONFIG.request_timeout()).expect("Failed to build HTTP client"));

pub fn build_http_client(timeout: Duration) -> reqwest::Result<Client> {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .user_agent(concat!("dnd-character-forge/", env!("CARGO_PKG_VERSION")))
        .build()
}

pub fn get_http_client() -> &'static Client {
    &HTTP_CLIENT
}
