use std::net::IpAddr;
use thiserror::Error;
use url::Url;

/// Reasons a feed URL is refused by `addfeed`.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    /// The URL string could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// The URL has no host component.
    #[error("URL has no host")]
    MissingHost,
    /// The URL points at loopback or a private network.
    #[error("Private or local address not allowed: {0} (set allow_private_hosts to permit)")]
    PrivateHost(String),
}

/// Validates a URL before it is stored as a feed.
///
/// Only `http`/`https` URLs with a host are accepted. Unless
/// `allow_private_hosts` is set, hosts on loopback, RFC 1918, link-local or
/// unique-local addresses are refused so that a shared aggregator cannot be
/// pointed at internal services.
///
/// # Examples
///
/// ```
/// use gator::util::validate_feed_url;
///
/// assert!(validate_feed_url("https://example.com/feed.xml", false).is_ok());
/// assert!(validate_feed_url("http://localhost:8080/rss", false).is_err());
/// assert!(validate_feed_url("http://localhost:8080/rss", true).is_ok());
/// assert!(validate_feed_url("file:///etc/passwd", true).is_err());
/// ```
pub fn validate_feed_url(url_str: &str, allow_private_hosts: bool) -> Result<Url, UrlValidationError> {
    let url = Url::parse(url_str.trim())?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }

    let host = url.host_str().ok_or(UrlValidationError::MissingHost)?;
    if allow_private_hosts {
        return Ok(url);
    }

    if host.eq_ignore_ascii_case("localhost") {
        return Err(UrlValidationError::PrivateHost(host.to_owned()));
    }

    // IPv6 hosts come back bracketed
    let bare = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    if let Ok(ip) = bare.parse::<IpAddr>() {
        if is_private_ip(&ip) {
            return Err(UrlValidationError::PrivateHost(ip.to_string()));
        }
    }

    Ok(url)
}

fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_private() || v4.is_loopback() || v4.is_link_local() || v4.is_unspecified()
        }
        IpAddr::V6(v6) => {
            let first = v6.segments()[0];
            v6.is_loopback()
                || v6.is_unspecified()
                || (first & 0xfe00) == 0xfc00 // unique local fc00::/7
                || (first & 0xffc0) == 0xfe80 // link local fe80::/10
        }
    }
}
