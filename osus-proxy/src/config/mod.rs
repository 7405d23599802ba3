/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Proxy configuration and user preferences.
//!
//! Configuration comes from two layers, applied in order:
//!
//! 1. An optional YAML file ([`ProxyConfig::load_from_file`]).
//! 2. Command-line overrides ([`ProxyConfig::apply_overrides`]).
//!
//! The expected YAML structure is (every key optional):
//! ```yaml
//! listen: "127.0.0.1:8000"
//! cert_path: "./server.crt"
//! key_path: "./server.key"
//! source_domain: "osus.zihad.dev"
//! upstream_scheme: https
//! preferences:
//!   server_address: "ppy.sh"
//!   fake_supporter: true
//!   beatmap_mirror: chimu
//!   fake_country: JP
//! ```

pub mod country;

pub use country::Country;

use std::fmt::{Display, Formatter};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

// ── Defaults ──────────────────────────────────────────────────────────────────

pub const DEFAULT_LISTEN: &str = "127.0.0.1:8000";
pub const DEFAULT_CERT_PATH: &str = "./server.crt";
pub const DEFAULT_KEY_PATH: &str = "./server.key";
pub const DEFAULT_SOURCE_DOMAIN: &str = "osus.zihad.dev";
pub const DEFAULT_SERVER_ADDRESS: &str = "ppy.sh";

// ── BeatmapMirror ─────────────────────────────────────────────────────────────

/// Where `osu.<source>/d/<id>` beatmap downloads are sent.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum BeatmapMirror {
    /// Forward the download to the configured server unchanged.
    ServerDefault,
    #[default]
    Chimu,
    BeatConnect,
    Nerinyan,
}

impl BeatmapMirror {
    /// Direct download URL for a beatmap set, or `None` for
    /// [`BeatmapMirror::ServerDefault`].
    pub fn direct_download_link(&self, set_id: u32, no_video: bool) -> Option<String> {
        let link = match self {
            BeatmapMirror::ServerDefault => return None,
            BeatmapMirror::Chimu if no_video => format!("https://api.chimu.moe/d/{set_id}?n=1"),
            BeatmapMirror::Chimu => format!("https://api.chimu.moe/d/{set_id}"),
            BeatmapMirror::BeatConnect => format!("https://beatconnect.io/b/{set_id}"),
            BeatmapMirror::Nerinyan if no_video => {
                format!("https://api.nerinyan.moe/d/{set_id}?nv=1")
            }
            BeatmapMirror::Nerinyan => format!("https://api.nerinyan.moe/d/{set_id}"),
        };
        Some(link)
    }
}

impl Display for BeatmapMirror {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            BeatmapMirror::ServerDefault => "Server Default",
            BeatmapMirror::Chimu => "chimu.moe",
            BeatmapMirror::BeatConnect => "BeatConnect",
            BeatmapMirror::Nerinyan => "nerinyan.moe",
        })
    }
}

// ── UpstreamScheme ────────────────────────────────────────────────────────────

/// Scheme used to reach the upstream server.  Plain HTTP is only useful
/// against a local test server.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpstreamScheme {
    Http,
    #[default]
    Https,
}

impl UpstreamScheme {
    pub fn as_str(self) -> &'static str {
        match self {
            UpstreamScheme::Http => "http",
            UpstreamScheme::Https => "https",
        }
    }
}

// ── Preferences ───────────────────────────────────────────────────────────────

/// Runtime-adjustable behaviour of the proxy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    /// Upstream base domain; `c.<server_address>` etc. are contacted.
    pub server_address: String,
    /// Set the supporter privilege bit in responses.
    pub fake_supporter: bool,
    pub beatmap_mirror: BeatmapMirror,
    /// Country shown for the logged-in user, client-side only.
    pub fake_country: Option<Country>,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            server_address: DEFAULT_SERVER_ADDRESS.to_owned(),
            fake_supporter: true,
            beatmap_mirror: BeatmapMirror::default(),
            fake_country: None,
        }
    }
}

/// Preferences shared between the server loop and the reload handler.
pub type SharedPreferences = Arc<RwLock<Preferences>>;

// ── ProxyConfig ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    pub listen: SocketAddr,
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    /// Domain the osu! client is pointed at (`-devserver`).
    pub source_domain: String,
    pub upstream_scheme: UpstreamScheme,
    pub preferences: Preferences,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN
                .parse()
                .unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], 8000))),
            cert_path: PathBuf::from(DEFAULT_CERT_PATH),
            key_path: PathBuf::from(DEFAULT_KEY_PATH),
            source_domain: DEFAULT_SOURCE_DOMAIN.to_owned(),
            upstream_scheme: UpstreamScheme::default(),
            preferences: Preferences::default(),
        }
    }
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub listen: Option<SocketAddr>,
    pub cert_path: Option<PathBuf>,
    pub key_path: Option<PathBuf>,
    pub server_address: Option<String>,
    pub beatmap_mirror: Option<BeatmapMirror>,
    pub fake_country: Option<Country>,
    pub no_fake_supporter: bool,
}

impl ProxyConfig {
    /// Parses the YAML file at `path`.  Missing keys take their defaults.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or the YAML is invalid.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        info!("Loading proxy configuration from: {}", path.display());

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot open configuration file: {}", path.display()))?;

        // An empty file is a valid "all defaults" configuration.
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: ProxyConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML file: {}", path.display()))?;

        debug!(?config, "Parsed configuration");
        Ok(config)
    }

    /// Loads `path` if given, otherwise defaults, then applies `overrides`.
    pub fn resolve(path: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(overrides);
        Ok(config)
    }

    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(listen) = overrides.listen {
            self.listen = listen;
        }
        if let Some(cert) = &overrides.cert_path {
            self.cert_path = cert.clone();
        }
        if let Some(key) = &overrides.key_path {
            self.key_path = key.clone();
        }
        if let Some(server) = &overrides.server_address {
            self.preferences.server_address = server.clone();
        }
        if let Some(mirror) = overrides.beatmap_mirror {
            self.preferences.beatmap_mirror = mirror;
        }
        if let Some(country) = overrides.fake_country {
            self.preferences.fake_country = Some(country);
        }
        if overrides.no_fake_supporter {
            self.preferences.fake_supporter = false;
        }
    }
}

/// Re-read `path`, re-apply `overrides` and swap the result into
/// `preferences`.  On error the previous preferences stay in place.
///
/// Listener settings in the file (address, certificate) are ignored here;
/// they only take effect on restart.
pub async fn reload_preferences(
    path: &Path,
    overrides: &ConfigOverrides,
    preferences: &SharedPreferences,
) -> Result<()> {
    let config = ProxyConfig::resolve(Some(path), overrides)?;
    *preferences.write().await = config.preferences;
    info!("Reloaded preferences from {}", path.display());
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Seek, Write};
    use tempfile::NamedTempFile;

    fn yaml_tempfile(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    // ── BeatmapMirror ─────────────────────────────────────────────────────────

    #[test]
    fn mirror_links() {
        assert_eq!(
            BeatmapMirror::Chimu.direct_download_link(123, false).unwrap(),
            "https://api.chimu.moe/d/123"
        );
        assert_eq!(
            BeatmapMirror::Chimu.direct_download_link(123, true).unwrap(),
            "https://api.chimu.moe/d/123?n=1"
        );
        assert_eq!(
            BeatmapMirror::BeatConnect.direct_download_link(9, true).unwrap(),
            "https://beatconnect.io/b/9"
        );
        assert_eq!(
            BeatmapMirror::Nerinyan.direct_download_link(7, true).unwrap(),
            "https://api.nerinyan.moe/d/7?nv=1"
        );
        assert!(BeatmapMirror::ServerDefault
            .direct_download_link(1, false)
            .is_none());
    }

    #[test]
    fn mirror_display_names() {
        assert_eq!(BeatmapMirror::ServerDefault.to_string(), "Server Default");
        assert_eq!(BeatmapMirror::Chimu.to_string(), "chimu.moe");
        assert_eq!(BeatmapMirror::Nerinyan.to_string(), "nerinyan.moe");
    }

    // ── Defaults ──────────────────────────────────────────────────────────────

    #[test]
    fn default_preferences() {
        let p = Preferences::default();
        assert_eq!(p.server_address, "ppy.sh");
        assert!(p.fake_supporter);
        assert_eq!(p.beatmap_mirror, BeatmapMirror::Chimu);
        assert_eq!(p.fake_country, None);
    }

    #[test]
    fn default_config() {
        let c = ProxyConfig::default();
        assert_eq!(c.listen, "127.0.0.1:8000".parse().unwrap());
        assert_eq!(c.source_domain, "osus.zihad.dev");
        assert_eq!(c.upstream_scheme, UpstreamScheme::Https);
    }

    // ── load_from_file ────────────────────────────────────────────────────────

    #[test]
    fn load_full_yaml() {
        let yaml = r#"
listen: "0.0.0.0:8443"
cert_path: "/etc/osus/cert.pem"
key_path: "/etc/osus/key.pem"
source_domain: "proxy.example"
upstream_scheme: http
preferences:
  server_address: "akatsuki.gg"
  fake_supporter: false
  beatmap_mirror: beat-connect
  fake_country: jp
"#;
        let f = yaml_tempfile(yaml);
        let c = ProxyConfig::load_from_file(f.path()).unwrap();

        assert_eq!(c.listen, "0.0.0.0:8443".parse().unwrap());
        assert_eq!(c.cert_path, PathBuf::from("/etc/osus/cert.pem"));
        assert_eq!(c.source_domain, "proxy.example");
        assert_eq!(c.upstream_scheme, UpstreamScheme::Http);
        assert_eq!(c.preferences.server_address, "akatsuki.gg");
        assert!(!c.preferences.fake_supporter);
        assert_eq!(c.preferences.beatmap_mirror, BeatmapMirror::BeatConnect);
        assert_eq!(c.preferences.fake_country.unwrap().alpha2(), "JP");
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let f = yaml_tempfile("preferences:\n  server_address: \"cmyui.xyz\"\n");
        let c = ProxyConfig::load_from_file(f.path()).unwrap();

        assert_eq!(c.preferences.server_address, "cmyui.xyz");
        assert!(c.preferences.fake_supporter);
        assert_eq!(c.listen, ProxyConfig::default().listen);
    }

    #[test]
    fn empty_file_is_all_defaults() {
        let f = yaml_tempfile("");
        assert_eq!(
            ProxyConfig::load_from_file(f.path()).unwrap(),
            ProxyConfig::default()
        );
    }

    #[test]
    fn missing_file_returns_error() {
        assert!(ProxyConfig::load_from_file(Path::new("/nonexistent/osus.yaml")).is_err());
    }

    #[test]
    fn malformed_yaml_returns_error() {
        let f = yaml_tempfile("this is: not: valid: yaml: content:::");
        assert!(ProxyConfig::load_from_file(f.path()).is_err());
    }

    #[test]
    fn unknown_country_returns_error() {
        let f = yaml_tempfile("preferences:\n  fake_country: QQ\n");
        assert!(ProxyConfig::load_from_file(f.path()).is_err());
    }

    // ── Overrides ─────────────────────────────────────────────────────────────

    #[test]
    fn overrides_win_over_file() {
        let f = yaml_tempfile(
            "listen: \"127.0.0.1:9000\"\npreferences:\n  server_address: \"a.example\"\n  beatmap_mirror: chimu\n",
        );
        let overrides = ConfigOverrides {
            server_address: Some("b.example".into()),
            beatmap_mirror: Some(BeatmapMirror::ServerDefault),
            no_fake_supporter: true,
            fake_country: Country::from_alpha2("de"),
            ..Default::default()
        };
        let c = ProxyConfig::resolve(Some(f.path()), &overrides).unwrap();

        assert_eq!(c.listen, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(c.preferences.server_address, "b.example");
        assert_eq!(c.preferences.beatmap_mirror, BeatmapMirror::ServerDefault);
        assert!(!c.preferences.fake_supporter);
        assert_eq!(c.preferences.fake_country, Country::from_alpha2("DE"));
    }

    #[test]
    fn resolve_without_file_uses_defaults() {
        let c = ProxyConfig::resolve(None, &ConfigOverrides::default()).unwrap();
        assert_eq!(c, ProxyConfig::default());
    }

    // ── Reload ────────────────────────────────────────────────────────────────

    fn shared(prefs: Preferences) -> SharedPreferences {
        Arc::new(RwLock::new(prefs))
    }

    #[tokio::test]
    async fn reload_picks_up_file_changes_and_keeps_overrides() {
        let mut f = yaml_tempfile("preferences:\n  server_address: \"a.example\"\n");
        let overrides = ConfigOverrides {
            fake_country: Country::from_alpha2("jp"),
            ..Default::default()
        };
        let prefs = shared(ProxyConfig::resolve(Some(f.path()), &overrides).unwrap().preferences);

        f.as_file_mut().set_len(0).unwrap();
        f.rewind().unwrap();
        f.write_all(b"preferences:\n  server_address: \"b.example\"\n  beatmap_mirror: nerinyan\n  fake_country: de\n")
            .unwrap();

        reload_preferences(f.path(), &overrides, &prefs).await.unwrap();

        let p = prefs.read().await;
        assert_eq!(p.server_address, "b.example");
        assert_eq!(p.beatmap_mirror, BeatmapMirror::Nerinyan);
        assert_eq!(p.fake_country, Country::from_alpha2("JP"));
    }

    #[tokio::test]
    async fn failed_reload_keeps_previous_preferences() {
        let f = yaml_tempfile("preferences:\n  fake_country: QQ\n");
        let before = Preferences {
            server_address: "keep.example".into(),
            ..Default::default()
        };
        let prefs = shared(before.clone());

        assert!(reload_preferences(f.path(), &ConfigOverrides::default(), &prefs)
            .await
            .is_err());
        assert_eq!(*prefs.read().await, before);
    }

    #[tokio::test]
    async fn reload_of_missing_file_is_error() {
        let prefs = shared(Preferences::default());
        let missing = Path::new("/nonexistent/osus-proxy.yaml");
        assert!(reload_preferences(missing, &ConfigOverrides::default(), &prefs)
            .await
            .is_err());
        assert_eq!(*prefs.read().await, Preferences::default());
    }
}
