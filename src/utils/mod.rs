//! Utility functions and helpers.

pub mod http;
pub mod validate;

use url::Url;

use crate::error::{AppError, Result};

/// Turn a host name or base URL into the URL of a site's root.
///
/// Bare hosts get `https://`. Any scheme other than `http` or `https` is rejected so that an
/// attacker-controlled host string cannot point the crawler at `file:` or similar.
pub fn site_url(host: &str) -> Result<Url> {
    let host = host.trim();
    let url = if host.contains("://") {
        Url::parse(host)?
    } else {
        Url::parse(&format!("https://{host}"))?
    };

    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(AppError::crawl(
                host,
                format!("refusing non-HTTP scheme {other:?}"),
            ));
        }
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(AppError::crawl(host, "URL has no host"));
    }
    Ok(url)
}

/// Site identifier for a host string: the lowercase host, plus port when not default.
pub fn site_id(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default().to_lowercase();
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_site_url_defaults_to_https() {
        let url = site_url("example.com").unwrap();
        assert_eq!(url.as_str(), "https://example.com/");
        assert_eq!(site_id(&url), "example.com");
    }

    #[test]
    fn test_site_url_keeps_http_and_port() {
        let url = site_url("http://127.0.0.1:8080").unwrap();
        assert_eq!(url.scheme(), "http");
        assert_eq!(site_id(&url), "127.0.0.1:8080");
    }

    #[test]
    fn test_site_url_rejects_other_schemes() {
        assert!(matches!(
            site_url("file:///etc/passwd"),
            Err(AppError::Crawl { .. })
        ));
        assert!(site_url("ftp://example.com").is_err());
        assert!(site_url("gopher://example.com").is_err());
    }
}
