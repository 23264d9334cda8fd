//! Caller Identity
//!
//! Derives the stable per-caller token used for per-identifier tiers.
//! Authenticated callers are keyed by session user id; everyone else by the
//! client address seen through proxy headers. Omitting every header lands
//! the caller in the shared anonymous bucket rather than a fresh quota.

use std::fmt;
use std::net::{IpAddr, SocketAddr};

use axum::http::HeaderMap;

/// Header carrying the authenticated session user id.
pub const USER_ID_HEADER: &str = "x-user-id";

// == Caller Identity ==
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CallerIdentity {
    User(String),
    Address(IpAddr),
    Anonymous,
}

impl CallerIdentity {
    // == From Request ==
    /// Resolution order: `x-user-id`, first hop of `x-forwarded-for`,
    /// `x-real-ip`, the peer address, then anonymous.
    pub fn from_request(headers: &HeaderMap, peer: Option<SocketAddr>) -> Self {
        if let Some(user) = header_str(headers, USER_ID_HEADER).filter(|v| !v.is_empty()) {
            return CallerIdentity::User(user.to_string());
        }

        let forwarded = header_str(headers, "x-forwarded-for")
            .and_then(|v| v.split(',').next())
            .and_then(|first| first.trim().parse().ok());
        if let Some(ip) = forwarded {
            return CallerIdentity::Address(ip);
        }

        let real_ip = header_str(headers, "x-real-ip").and_then(|v| v.parse().ok());
        if let Some(ip) = real_ip {
            return CallerIdentity::Address(ip);
        }

        match peer {
            Some(addr) => CallerIdentity::Address(addr.ip()),
            None => CallerIdentity::Anonymous,
        }
    }

    /// Token used in counter keys.
    pub fn as_key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CallerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallerIdentity::User(id) => write!(f, "user:{}", id),
            CallerIdentity::Address(ip) => write!(f, "ip:{}", ip),
            CallerIdentity::Anonymous => f.write_str("anonymous"),
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
}
