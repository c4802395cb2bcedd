//! Client IP discovery and allow/deny matching.
//!
//! Patterns come in three shapes, tried in this order:
//!
//! - an exact address (`192.168.1.10`, `::1`)
//! - a CIDR block (`10.0.0.0/8`, `2001:db8::/32`)
//! - a wildcard where `*` stands for one or more digits (`192.168.*.*`)

use actix_web::HttpRequest;
use std::net::IpAddr;

use crate::config::{FirewallMode, FirewallSettings};

const FORWARDED_HEADERS: [&str; 3] = ["cf-connecting-ip", "x-forwarded-for", "x-real-ip"];

/// The first header (or the socket peer) that carries a parseable address.
pub fn client_ip(req: &HttpRequest, trust_forwarded_headers: bool) -> Option<IpAddr> {
    if trust_forwarded_headers {
        for name in FORWARDED_HEADERS {
            let candidate = req
                .headers()
                .get(name)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.split(',').next())
                .and_then(|value| value.trim().parse::<IpAddr>().ok());
            if candidate.is_some() {
                return candidate;
            }
        }
    }
    req.peer_addr().map(|addr| addr.ip())
}

/// Key under which throttle state is kept for `ip`.
pub fn ip_key(ip: Option<IpAddr>) -> String {
    ip.map(|ip| ip.to_string()).unwrap_or_else(|| "unknown".to_string())
}

pub fn is_allowed(settings: &FirewallSettings, ip: Option<IpAddr>) -> bool {
    let Some(ip) = ip else {
        return settings.mode != FirewallMode::Whitelist;
    };
    match settings.mode {
        FirewallMode::Disabled => true,
        FirewallMode::Blacklist => !settings.blacklist.iter().any(|p| matches_pattern(&ip, p)),
        FirewallMode::Whitelist => settings.whitelist.iter().any(|p| matches_pattern(&ip, p)),
    }
}

pub fn matches_pattern(ip: &IpAddr, pattern: &str) -> bool {
    let pattern = pattern.trim();
    if pattern.parse::<IpAddr>().is_ok_and(|exact| exact == *ip) || ip.to_string() == pattern {
        return true;
    }
    if pattern.contains('/') {
        return matches_cidr(ip, pattern);
    }
    if pattern.contains('*') {
        return matches_wildcard(&ip.to_string(), pattern);
    }
    false
}

fn matches_cidr(ip: &IpAddr, cidr: &str) -> bool {
    let Some((subnet, prefix)) = cidr.split_once('/') else {
        return false;
    };
    let (Ok(subnet), Ok(prefix)) = (subnet.trim().parse::<IpAddr>(), prefix.trim().parse::<u32>())
    else {
        return false;
    };

    match (ip, subnet) {
        (IpAddr::V4(ip), IpAddr::V4(subnet)) if prefix <= 32 => {
            let mask = u32::MAX.checked_shl(32 - prefix).unwrap_or(0);
            u32::from(*ip) & mask == u32::from(subnet) & mask
        }
        (IpAddr::V6(ip), IpAddr::V6(subnet)) if prefix <= 128 => {
            let mask = u128::MAX.checked_shl(128 - prefix).unwrap_or(0);
            u128::from(*ip) & mask == u128::from(subnet) & mask
        }
        _ => false,
    }
}

/// `*` matches a non-empty run of digits, every other character itself.
fn matches_wildcard(ip: &str, pattern: &str) -> bool {
    fn go(text: &[u8], pattern: &[u8]) -> bool {
        match pattern.split_first() {
            None => text.is_empty(),
            Some((b'*', rest)) => {
                let digits = text.iter().take_while(|b| b.is_ascii_digit()).count();
                (1..=digits).any(|n| go(&text[n..], rest))
            }
            Some((expected, rest)) => text.first() == Some(expected) && go(&text[1..], rest),
        }
    }
    go(ip.as_bytes(), pattern.as_bytes())
}
