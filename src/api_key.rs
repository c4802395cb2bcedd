use actix_web::HttpRequest;

use crate::config::ApiKeySettings;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Host part of an `Origin` / `Referer` value, without port.
pub fn host_of(url: &str) -> Option<String> {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    let authority = rest.split(['/', '?', '#']).next()?;
    let authority = authority.rsplit_once('@').map_or(authority, |(_, host)| host);
    let host = if let Some(bracketed) = authority.strip_prefix('[') {
        bracketed.split(']').next()?
    } else {
        authority.split(':').next()?
    };
    (!host.is_empty()).then(|| host.to_lowercase())
}

/// Origin host of the caller, taken from `Origin`, then `Referer`.
pub fn request_origin(req: &HttpRequest) -> Option<String> {
    ["origin", "referer"].into_iter().find_map(|name| {
        req.headers()
            .get(name)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
            .and_then(host_of)
    })
}

/// Exact host, or `*.example.com` matching the apex and any subdomain.
pub fn matches_domain(domain: &str, pattern: &str) -> bool {
    if domain == pattern {
        return true;
    }
    match pattern.strip_prefix("*.") {
        Some(suffix) => domain == suffix || domain.ends_with(&format!(".{suffix}")),
        None => false,
    }
}

/// Same-origin callers never need a key. Everyone else needs an enabled
/// key whose domain list, if any, covers their origin.
pub fn verify(
    settings: &ApiKeySettings,
    origin: Option<&str>,
    server_host: Option<&str>,
    key: Option<&str>,
) -> bool {
    if !settings.require {
        return true;
    }
    if let (Some(origin), Some(server_host)) = (origin, server_host.and_then(host_of)) {
        if origin == server_host {
            return true;
        }
    }

    let Some(key) = key.map(str::trim).filter(|key| !key.is_empty()) else {
        return false;
    };
    let Some(entry) = settings.keys.iter().find(|entry| entry.key == key && entry.enabled) else {
        return false;
    };
    if entry.domains.is_empty() {
        return true;
    }
    origin.is_some_and(|origin| entry.domains.iter().any(|d| matches_domain(origin, d)))
}
