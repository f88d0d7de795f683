use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

pub fn http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("idp_portal/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to build http client")
}
