// src/utils/http.rs

//! HTTP client utilities.

use crate::error::{AppError, Result};
use crate::models::CrawlerConfig;

/// Create a configured asynchronous HTTP client.
///
/// Every request made through it is bounded by `timeout_secs`.
pub fn create_async_client(config: &CrawlerConfig) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .timeout(config.timeout())
        .build()?;
    Ok(client)
}

/// Fetch a page body asynchronously.
///
/// Non-success statuses are errors rather than pages to parse. Parsing is left to the
/// caller because `scraper::Html` cannot be held across an `.await` in a spawned task.
pub async fn fetch_page_text(client: &reqwest::Client, url: &str) -> Result<String> {
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(AppError::crawl(url, format!("HTTP status {status}")));
    }
    Ok(response.text().await?)
}
