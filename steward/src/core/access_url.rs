//! Access URL extraction and the user-facing (non-loopback) check.
//!
//! Escalations are read by a remote operator, so a loopback or unspecified
//! host is never acceptable, and neither are embedded credentials.

use std::fmt;
use std::net::IpAddr;
use std::sync::LazyLock;

use anyhow::{Result, anyhow};
use regex::Regex;
use serde::{Deserialize, Serialize};

static ACCESS_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"https?://[^\s"'<>()]+/vnc(?:_lite)?\.html(?:[?#][^\s"'<>()]*)?"#)
        .expect("valid access url pattern")
});

fn authority(url: &str) -> Option<&str> {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))?;
    rest.split(['/', '?', '#']).next()
}

/// True if the authority carries `user[:password]@`.
pub fn has_userinfo(url: &str) -> bool {
    authority(url).is_some_and(|authority| authority.contains('@'))
}

/// Host part of an `http(s)` URL, without port or brackets.
pub fn url_host(url: &str) -> Option<&str> {
    let host_port = authority(url)?.rsplit('@').next()?;
    let host = if let Some(bracketed) = host_port.strip_prefix('[') {
        bracketed.split(']').next()?
    } else {
        host_port.split(':').next()?
    };
    if host.is_empty() { None } else { Some(host) }
}

fn is_loopback_host(host: &str) -> bool {
    let lower = host.to_ascii_lowercase();
    if lower == "localhost" || lower.ends_with(".localhost") {
        return true;
    }
    match lower.parse::<IpAddr>() {
        Ok(ip) => ip.is_loopback() || ip.is_unspecified(),
        Err(_) => false,
    }
}

/// True if `url` can be handed to a remote operator.
pub fn is_user_facing(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    if lower.contains("localhost") || lower.contains("127.0.0.1") || has_userinfo(url) {
        return false;
    }
    match url_host(url) {
        Some(host) => !is_loopback_host(host),
        None => false,
    }
}

/// First user-facing access URL found in `text`, in order of appearance.
pub fn find_access_url(text: &str) -> Option<&str> {
    ACCESS_URL
        .find_iter(text)
        .map(|m| m.as_str())
        .find(|candidate| is_user_facing(candidate))
}

/// Fallback access URL, validated as user-facing when constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CanonicalUrl(String);

impl CanonicalUrl {
    pub fn parse(url: &str) -> Result<Self> {
        let trimmed = url.trim();
        if url_host(trimmed).is_none() {
            return Err(anyhow!("canonical url must be an http(s) url with a host"));
        }
        if has_userinfo(trimmed) {
            return Err(anyhow!("canonical url must not embed credentials"));
        }
        if !is_user_facing(trimmed) {
            return Err(anyhow!(
                "canonical url must not point at a loopback or local address"
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CanonicalUrl {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self> {
        CanonicalUrl::parse(&value)
    }
}

impl From<CanonicalUrl> for String {
    fn from(value: CanonicalUrl) -> Self {
        value.0
    }
}

impl fmt::Display for CanonicalUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
