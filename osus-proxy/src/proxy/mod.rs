/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! The HTTPS reverse proxy.
//!
//! ```text
//! TcpListener ─► TlsAcceptor ─► hyper http1 connection ─► Proxy::handle
//!                                                           │
//!            ┌── 302 to beatmap mirror (no upstream) ◄──────┤
//!            │                                              ▼
//!            │                                  reqwest ─► <sub>.<server>
//!            │                                              │
//!            └──────────── response ◄── packet rewrite ◄────┘
//! ```
//!
//! [`Proxy`] holds everything a request needs and is shared across
//! connections behind an `Arc`.  Preferences are read once per request into a
//! snapshot so no lock is held across upstream I/O.

pub mod error;
pub mod rewrite;
pub mod routing;
pub mod session;
pub mod tls;

pub use error::ProxyError;
pub use routing::Route;
pub use session::SessionTracker;

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::header::{self, HeaderMap, HeaderValue};
use http::request::Parts;
use http::{Method, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, warn};

use crate::bancho;
use crate::config::{Preferences, ProxyConfig, SharedPreferences, UpstreamScheme};

// ── Constants ─────────────────────────────────────────────────────────────────

/// Headers that describe a single hop and must not be forwarded.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "host",
    "content-length",
    "transfer-encoding",
    "te",
    "trailer",
    "upgrade",
    "keep-alive",
    "proxy-connection",
    "proxy-authorization",
    "proxy-authenticate",
];

const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_REAL_IP: &str = "x-real-ip";

const UPSTREAM_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(60);

pub type ProxyResponse = Response<Full<Bytes>>;

// ── Proxy ─────────────────────────────────────────────────────────────────────

pub struct Proxy {
    source_domain: String,
    scheme: UpstreamScheme,
    preferences: SharedPreferences,
    sessions: SessionTracker,
    client: reqwest::Client,
}

impl Proxy {
    /// Create a proxy with its own pooled upstream client.
    pub fn new(config: &ProxyConfig, preferences: SharedPreferences) -> Result<Self, ProxyError> {
        let client = reqwest::Client::builder()
            .connect_timeout(UPSTREAM_CONNECT_TIMEOUT)
            .timeout(UPSTREAM_TIMEOUT)
            // Redirects belong to the osu! client, not to us.
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(ProxyError::Client)?;
        Ok(Self::with_client(config, preferences, client))
    }

    /// Create a proxy around an existing client (e.g. one with DNS
    /// overrides for local testing).
    pub fn with_client(
        config: &ProxyConfig,
        preferences: SharedPreferences,
        client: reqwest::Client,
    ) -> Self {
        Self {
            source_domain: config.source_domain.clone(),
            scheme: config.upstream_scheme,
            preferences,
            sessions: SessionTracker::new(),
            client,
        }
    }

    pub fn preferences(&self) -> &SharedPreferences {
        &self.preferences
    }

    pub fn sessions(&self) -> &SessionTracker {
        &self.sessions
    }

    // ── Request handling ──────────────────────────────────────────────────────

    /// Handle one fully-buffered client request.  Never fails: every error
    /// becomes a `500` response.
    pub async fn handle(
        &self,
        parts: Parts,
        body: Bytes,
        remote_addr: Option<SocketAddr>,
    ) -> ProxyResponse {
        let prefs = self.preferences.read().await.clone();

        let route = match request_host(&parts)
            .and_then(|host| routing::resolve(&host, &self.source_domain, &prefs.server_address))
        {
            Ok(route) => route,
            Err(e) => {
                warn!(uri = %parts.uri, error = %e, "Rejecting request");
                return text_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
            }
        };

        if let Some(redirect) = download_redirect(&route, &parts, &prefs) {
            return redirect;
        }

        self.forward(route, parts, body, remote_addr, &prefs).await
    }

    async fn forward(
        &self,
        route: Route,
        parts: Parts,
        body: Bytes,
        remote_addr: Option<SocketAddr>,
        prefs: &Preferences,
    ) -> ProxyResponse {
        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let url = format!(
            "{}://{}{}",
            self.scheme.as_str(),
            route.target_host,
            path_and_query
        );

        let headers = match upstream_headers(&parts.headers, &route.target_host, remote_addr) {
            Ok(headers) => headers,
            Err(e) => return text_response(StatusCode::INTERNAL_SERVER_ERROR, e),
        };
        let session_user = parts
            .headers
            .get(session::SESSION_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|token| self.sessions.lookup(token));

        debug!(method = %parts.method, %url, "Forwarding request");

        let result = self
            .client
            .request(parts.method.clone(), &url)
            .headers(headers)
            .body(body)
            .send()
            .await;
        let upstream = match result {
            Ok(resp) => resp,
            Err(e) => {
                error!(%url, error = %e, "Upstream request failed");
                return text_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("error fetching: {e}"),
                );
            }
        };

        let status = upstream.status();
        let mut resp_headers = upstream.headers().clone();
        let resp_body = match upstream.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(%url, error = %e, "Reading upstream body failed");
                return text_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("error fetching: {e}"),
                );
            }
        };

        let rewritable = route.is_bancho()
            && parts.method == Method::POST
            && parts.uri.path() == "/"
            && status.is_success()
            && !resp_headers.contains_key(header::CONTENT_ENCODING);

        let resp_body = if rewritable {
            self.rewrite_bancho(resp_body, &resp_headers, session_user, prefs)
        } else {
            resp_body
        };

        strip_hop_by_hop(&mut resp_headers);
        let mut response = Response::new(Full::new(resp_body));
        *response.status_mut() = status;
        *response.headers_mut() = resp_headers;
        response
    }

    fn rewrite_bancho(
        &self,
        body: Bytes,
        resp_headers: &HeaderMap,
        session_user: Option<i32>,
        prefs: &Preferences,
    ) -> Bytes {
        let mut stream = match bancho::decode_stream(&body) {
            Ok(stream) => stream,
            Err(e) => {
                warn!(error = %e, len = body.len(), "Could not decode bancho response, passing through");
                return body;
            }
        };

        let outcome = rewrite::apply(prefs, session_user, &mut stream);

        if let Some(user_id) = outcome.login_user {
            match resp_headers
                .get(session::LOGIN_TOKEN_HEADER)
                .and_then(|v| v.to_str().ok())
            {
                Some(token) => {
                    info!(user_id, "Login succeeded");
                    self.sessions.register(token, user_id);
                }
                None => warn!(user_id, "Login reply without session token"),
            }
        }

        if outcome.modified == 0 {
            return body;
        }
        debug!(
            packets = stream.packets.len(),
            modified = outcome.modified,
            "Rewrote bancho response"
        );
        Bytes::from(stream.encode())
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn request_host(parts: &Parts) -> Result<String, ProxyError> {
    parts
        .headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
        .or_else(|| parts.uri.authority().map(|a| a.to_string()))
        .ok_or(ProxyError::MissingHost)
}

/// `302` to the configured beatmap mirror for `GET osu.<source>/d/<id>`.
fn download_redirect(route: &Route, parts: &Parts, prefs: &Preferences) -> Option<ProxyResponse> {
    if !route.is_osu_web() || parts.method != Method::GET {
        return None;
    }
    let (set_id, no_video) = routing::beatmap_download(parts.uri.path())?;
    let link = prefs.beatmap_mirror.direct_download_link(set_id, no_video)?;
    let location = HeaderValue::from_str(&link).ok()?;

    info!(
        set_id,
        mirror = %prefs.beatmap_mirror,
        "Redirecting beatmap download"
    );
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = StatusCode::FOUND;
    response.headers_mut().insert(header::LOCATION, location);
    Some(response)
}

/// Remove the fixed hop-by-hop headers plus any header the `Connection`
/// header names.
fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<String> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|name| name.trim().to_ascii_lowercase())
        .filter(|name| !name.is_empty())
        .collect();
    for name in &listed {
        headers.remove(name.as_str());
    }
    for name in HOP_BY_HOP {
        headers.remove(*name);
    }
}

/// Client headers minus hop-by-hop ones, with `Host` and forwarding headers
/// set for the upstream.
fn upstream_headers(
    client: &HeaderMap,
    target_host: &str,
    remote_addr: Option<SocketAddr>,
) -> Result<HeaderMap, String> {
    let mut headers = client.clone();
    strip_hop_by_hop(&mut headers);

    let host = HeaderValue::from_str(target_host)
        .map_err(|_| format!("invalid target host {target_host}"))?;
    headers.insert(header::HOST, host);

    if let Some(addr) = remote_addr {
        // An IP address is always a valid header value.
        if let Ok(ip) = HeaderValue::from_str(&addr.ip().to_string()) {
            headers.insert(X_FORWARDED_FOR, ip.clone());
            headers.insert(X_REAL_IP, ip);
        }
    }
    Ok(headers)
}

fn text_response(status: StatusCode, body: impl Into<String>) -> ProxyResponse {
    let mut response = Response::new(Full::new(Bytes::from(body.into())));
    *response.status_mut() = status;
    response
}

// ── Server loop ───────────────────────────────────────────────────────────────

/// Bind the listener configured in `config`.
pub async fn bind(config: &ProxyConfig) -> Result<TcpListener, ProxyError> {
    TcpListener::bind(config.listen)
        .await
        .map_err(|source| ProxyError::Bind {
            addr: config.listen,
            source,
        })
}

/// Accept TLS connections until `shutdown` resolves.
///
/// Per-connection failures (handshake, protocol, client disconnect) are
/// logged and never stop the listener.
pub async fn serve(
    proxy: Arc<Proxy>,
    listener: TcpListener,
    acceptor: TlsAcceptor,
    shutdown: impl Future<Output = ()>,
) {
    tokio::pin!(shutdown);

    if let Ok(addr) = listener.local_addr() {
        info!("Starting to serve on https://{}", addr);
    }

    loop {
        let (stream, remote_addr) = tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown requested, no longer accepting connections");
                return;
            }
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    warn!(error = %e, "Accept failed");
                    continue;
                }
            },
        };

        let proxy = proxy.clone();
        let acceptor = acceptor.clone();
        tokio::spawn(async move {
            let tls = match acceptor.accept(stream).await {
                Ok(tls) => tls,
                Err(e) => {
                    debug!(%remote_addr, error = %e, "TLS handshake failed");
                    return;
                }
            };

            let service = service_fn(move |req: Request<Incoming>| {
                let proxy = proxy.clone();
                async move {
                    let (parts, body) = req.into_parts();
                    let response = match body.collect().await {
                        Ok(collected) => {
                            proxy
                                .handle(parts, collected.to_bytes(), Some(remote_addr))
                                .await
                        }
                        Err(e) => text_response(
                            StatusCode::BAD_REQUEST,
                            format!("error reading request body: {e}"),
                        ),
                    };
                    Ok::<_, Infallible>(response)
                }
            });

            if let Err(e) = http1::Builder::new()
                .serve_connection(TokioIo::new(tls), service)
                .await
            {
                debug!(%remote_addr, error = %e, "Connection closed with error");
            }
        });
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BeatmapMirror;

    fn parts(method: Method, uri: &str, host: Option<&str>) -> Parts {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(host) = host {
            builder = builder.header(header::HOST, host);
        }
        builder.body(()).unwrap().into_parts().0
    }

    fn osu_route() -> Route {
        routing::resolve("osu.osus.zihad.dev", "osus.zihad.dev", "ppy.sh").unwrap()
    }

    #[test]
    fn host_header_preferred_then_authority() {
        let p = parts(Method::GET, "/", Some("c.osus.zihad.dev"));
        assert_eq!(request_host(&p).unwrap(), "c.osus.zihad.dev");

        let p = parts(Method::GET, "https://ce.osus.zihad.dev/", None);
        assert_eq!(request_host(&p).unwrap(), "ce.osus.zihad.dev");

        let p = parts(Method::GET, "/", None);
        assert!(matches!(request_host(&p), Err(ProxyError::MissingHost)));
    }

    #[test]
    fn redirect_for_mirror_download() {
        let prefs = Preferences {
            beatmap_mirror: BeatmapMirror::Nerinyan,
            ..Default::default()
        };
        let p = parts(Method::GET, "/d/42n", Some("osu.osus.zihad.dev"));
        let resp = download_redirect(&osu_route(), &p, &prefs).unwrap();
        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(
            resp.headers()[header::LOCATION],
            "https://api.nerinyan.moe/d/42?nv=1"
        );
    }

    #[test]
    fn no_redirect_for_server_default_post_or_bad_id() {
        let default = Preferences {
            beatmap_mirror: BeatmapMirror::ServerDefault,
            ..Default::default()
        };
        let chimu = Preferences::default();

        let get = parts(Method::GET, "/d/42", Some("osu.osus.zihad.dev"));
        assert!(download_redirect(&osu_route(), &get, &default).is_none());

        let post = parts(Method::POST, "/d/42", Some("osu.osus.zihad.dev"));
        assert!(download_redirect(&osu_route(), &post, &chimu).is_none());

        let bad = parts(Method::GET, "/d/latest", Some("osu.osus.zihad.dev"));
        assert!(download_redirect(&osu_route(), &bad, &chimu).is_none());

        let bancho = routing::resolve("c.osus.zihad.dev", "osus.zihad.dev", "ppy.sh").unwrap();
        assert!(download_redirect(&bancho, &get, &chimu).is_none());
    }

    #[test]
    fn upstream_headers_rewrite_host_and_forwarding() {
        let mut client = HeaderMap::new();
        client.insert(header::HOST, HeaderValue::from_static("c.osus.zihad.dev"));
        client.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        client.insert(header::CONTENT_LENGTH, HeaderValue::from_static("12"));
        client.insert("osu-token", HeaderValue::from_static("abc"));
        client.insert(header::USER_AGENT, HeaderValue::from_static("osu!"));

        let remote: SocketAddr = "192.168.1.20:50000".parse().unwrap();
        let h = upstream_headers(&client, "c.ppy.sh", Some(remote)).unwrap();

        assert_eq!(h[header::HOST], "c.ppy.sh");
        assert_eq!(h[X_FORWARDED_FOR], "192.168.1.20");
        assert_eq!(h[X_REAL_IP], "192.168.1.20");
        assert_eq!(h["osu-token"], "abc");
        assert_eq!(h[header::USER_AGENT], "osu!");
        assert!(!h.contains_key(header::CONNECTION));
        assert!(!h.contains_key(header::CONTENT_LENGTH));
    }

    #[test]
    fn headers_named_by_connection_are_stripped() {
        let mut client = HeaderMap::new();
        client.insert(header::CONNECTION, HeaderValue::from_static("X-Trace, keep-alive"));
        client.append(header::CONNECTION, HeaderValue::from_static("x-hop"));
        client.insert("x-trace", HeaderValue::from_static("1"));
        client.insert("x-hop", HeaderValue::from_static("2"));
        client.insert("osu-token", HeaderValue::from_static("abc"));

        let h = upstream_headers(&client, "c.ppy.sh", None).unwrap();
        assert!(!h.contains_key("x-trace"));
        assert!(!h.contains_key("x-hop"));
        assert!(!h.contains_key(header::CONNECTION));
        assert_eq!(h["osu-token"], "abc");

        let mut upstream = client.clone();
        strip_hop_by_hop(&mut upstream);
        assert!(!upstream.contains_key("x-trace"));
        assert_eq!(upstream["osu-token"], "abc");
    }

    #[test]
    fn upstream_headers_without_remote_addr() {
        let h = upstream_headers(&HeaderMap::new(), "osu.ppy.sh", None).unwrap();
        assert!(!h.contains_key(X_FORWARDED_FOR));
        assert_eq!(h[header::HOST], "osu.ppy.sh");
    }
}
