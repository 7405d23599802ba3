/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Update check.
//!
//! The update server answers `HEAD` with an `X-Content-Hash: sha256-<hex>`
//! header describing the latest published executable.  An update is
//! available when that digest differs from the digest of the running binary.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tracing::debug;

pub const UPDATE_URL: &str = "https://osus-proxy-update-server.vercel.app/api/handler";

const CONTENT_HASH_HEADER: &str = "x-content-hash";
const HASH_PREFIX: &str = "sha256-";

#[derive(Debug, Clone)]
pub struct Updater {
    client: reqwest::Client,
    url: String,
}

impl Default for Updater {
    fn default() -> Self {
        Self::new(UPDATE_URL)
    }
}

impl Updater {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            url: url.into(),
        }
    }

    /// Returns `true` when the published executable differs from the one at
    /// `exe_path`.  A missing or malformed hash header means "no update".
    ///
    /// # Errors
    /// Network failures and an unreadable executable.
    pub async fn check_for_updates(&self, exe_path: &Path) -> Result<bool> {
        let resp = self
            .client
            .head(&self.url)
            .send()
            .await
            .with_context(|| format!("Update server unreachable: {}", self.url))?;

        let Some(remote) = resp
            .headers()
            .get(CONTENT_HASH_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_hash)
        else {
            debug!("Update server sent no usable content hash");
            return Ok(false);
        };

        let local = file_digest(exe_path).await?;
        debug!(%local, %remote, "Comparing executable digests");
        Ok(!remote.eq_ignore_ascii_case(&local))
    }
}

/// Extract the hex digest from `sha256-<hex>`.
pub fn parse_content_hash(value: &str) -> Option<String> {
    let hex = value.trim().strip_prefix(HASH_PREFIX)?;
    (!hex.is_empty()).then(|| hex.to_owned())
}

/// Lowercase hex SHA-256 of a file.
pub async fn file_digest(path: &Path) -> Result<String> {
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("Cannot read executable: {}", path.display()))?;
    Ok(hex::encode(Sha256::digest(&data)))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
