/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Host → upstream mapping and request classification.
//!
//! The osu! client is started with `-devserver <source domain>` and then
//! talks to a fixed set of subdomains of it.  Each one maps onto the same
//! subdomain of the configured server address:
//!
//! ```text
//! c.osus.zihad.dev    ──►  c.ppy.sh
//! osu.osus.zihad.dev  ──►  osu.ppy.sh
//! ```

use super::error::ProxyError;

/// Subdomains the osu! client contacts.
pub const SUBDOMAINS: &[&str] = &["c", "ce", "c4", "osu", "b", "api"];

/// Subdomains that speak the bancho packet protocol.
const BANCHO_SUBDOMAINS: &[&str] = &["c", "ce", "c4"];

/// Where a request is going.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub subdomain: &'static str,
    pub target_host: String,
}

impl Route {
    pub fn is_bancho(&self) -> bool {
        BANCHO_SUBDOMAINS.contains(&self.subdomain)
    }

    /// The `osu.` web host, which serves beatmap downloads.
    pub fn is_osu_web(&self) -> bool {
        self.subdomain == "osu"
    }
}

/// Strip a trailing `:port` if present.
fn strip_port(host: &str) -> &str {
    match host.rsplit_once(':') {
        Some((name, port)) if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => name,
        _ => host,
    }
}

/// Map a client `Host` value onto its upstream host.
///
/// # Errors
/// [`ProxyError::UnknownHost`] when `host` is not
/// `<subdomain>.<source_domain>` for one of [`SUBDOMAINS`].
pub fn resolve(host: &str, source_domain: &str, server_address: &str) -> Result<Route, ProxyError> {
    let name = strip_port(host.trim()).as_bytes();
    let domain = source_domain.as_bytes();

    SUBDOMAINS
        .iter()
        .find(|&&sub| {
            let sub = sub.as_bytes();
            name.len() == sub.len() + 1 + domain.len()
                && name[..sub.len()].eq_ignore_ascii_case(sub)
                && name[sub.len()] == b'.'
                && name[sub.len() + 1..].eq_ignore_ascii_case(domain)
        })
        .map(|&sub| Route {
            subdomain: sub,
            target_host: format!("{sub}.{server_address}"),
        })
        .ok_or_else(|| ProxyError::UnknownHost {
            host: host.to_owned(),
        })
}

/// Parse a beatmap download path: `/d/<set id>` or `/d/<set id>n`, where
/// the `n` suffix asks for the set without video.
///
/// Returns `(set_id, no_video)`.
pub fn beatmap_download(path: &str) -> Option<(u32, bool)> {
    let rest = path.strip_prefix("/d/")?;
    let (id, no_video) = match rest.strip_suffix('n') {
        Some(id) => (id, true),
        None => (rest, false),
    };
    id.parse().ok().map(|id| (id, no_video))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
