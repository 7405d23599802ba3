/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! bancho-sim – a tiny plain-HTTP bancho server for poking at osus-proxy.
//!
//! Example (with a `hosts` entry mapping `c.bancho.local` to 127.0.0.1):
//!
//! ```text
//! bancho-sim --port 8080 --user-id 1001 --country 56
//! osus-proxy -c sim.yaml       # server_address: "bancho.local:8080"
//!                              # upstream_scheme: http
//! ```

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use bytes::Bytes;
use clap::Parser;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use osus_proxy::bancho::{BanchoPacket, OsuMessage, UserPresence};

#[derive(Debug, Parser)]
#[command(name = "bancho-sim", about = "Plain-HTTP bancho simulator for osus-proxy")]
struct Cli {
    /// Port to listen on (127.0.0.1).
    #[arg(short = 'p', long = "port", default_value_t = 8080)]
    port: u16,

    /// User id returned in LoginReply.  Use a negative value to simulate a
    /// failed login.
    #[arg(short = 'u', long = "user-id", default_value_t = 1001, allow_negative_numbers = true)]
    user_id: i32,

    /// Username in the presence packet.
    #[arg(short = 'n', long = "name", default_value = "sim-player")]
    name: String,

    /// osu! country byte in the presence packet.
    #[arg(long = "country", default_value_t = 0)]
    country: u8,

    /// Client privileges bitfield (1 = player, 4 = supporter).
    #[arg(long = "privileges", default_value_t = 1)]
    privileges: u32,
}

struct Sim {
    cli: Cli,
    sessions: AtomicU64,
}

impl Sim {
    fn presence(&self) -> BanchoPacket {
        BanchoPacket::UserPresence(UserPresence {
            user_id: self.cli.user_id,
            username: self.cli.name.clone(),
            utc_offset: 24,
            country: self.cli.country,
            privileges_and_mode: (self.cli.privileges & 0x1f) as u8,
            ..Default::default()
        })
    }

    fn login(&self) -> (String, Vec<u8>) {
        let token = format!("sim-{}", self.sessions.fetch_add(1, Ordering::Relaxed));
        let mut packets = vec![BanchoPacket::LoginReply(self.cli.user_id)];
        if self.cli.user_id > 0 {
            packets.push(BanchoPacket::Privileges(self.cli.privileges));
            packets.push(self.presence());
        }
        (token, encode(&packets))
    }

    fn poll(&self) -> Vec<u8> {
        encode(&[
            self.presence(),
            BanchoPacket::SendMessage(OsuMessage {
                sender: "BanchoBot".into(),
                text: "hello from bancho-sim".into(),
                recipient: "#osu".into(),
                sender_id: 3,
            }),
        ])
    }

    async fn handle(self: Arc<Self>, req: Request<Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
        let host = req
            .headers()
            .get(hyper::header::HOST)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-")
            .to_owned();
        debug!(method = %req.method(), %host, path = %req.uri().path(), "Request");

        if req.method() != Method::POST || req.uri().path() != "/" {
            return Ok(Response::new(Full::new(Bytes::from_static(b"bancho-sim"))));
        }

        let response = match req.headers().get("osu-token") {
            Some(_) => Response::new(Full::new(Bytes::from(self.poll()))),
            None => {
                let (token, body) = self.login();
                info!(%token, user_id = self.cli.user_id, "Login");
                Response::builder()
                    .header("cho-token", token)
                    .body(Full::new(Bytes::from(body)))
                    .unwrap_or_else(|_| Response::new(Full::new(Bytes::new())))
            }
        };
        Ok(response)
    }
}

fn encode(packets: &[BanchoPacket]) -> Vec<u8> {
    packets.iter().flat_map(BanchoPacket::to_bytes).collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
        )
        .init();

    let cli = Cli::parse();
    let addr = SocketAddr::from(([127, 0, 0, 1], cli.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Cannot bind {addr}"))?;
    info!("bancho-sim listening on http://{}", addr);

    let sim = Arc::new(Sim {
        cli,
        sessions: AtomicU64::new(1),
    });

    loop {
        let (stream, remote) = listener.accept().await?;
        let sim = sim.clone();
        tokio::spawn(async move {
            let service = service_fn(move |req| sim.clone().handle(req));
            if let Err(e) = http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service)
                .await
            {
                warn!(%remote, error = %e, "Connection error");
            }
        });
    }
}
