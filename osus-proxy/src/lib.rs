/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! osus-proxy – HTTPS reverse proxy for osu! bancho servers
//!
//! Module layout:
//!
//! ```text
//! lib.rs
//! ├── bancho/     – binary packet codec (header, ULEB128, strings, packets)
//! ├── config/     – preferences, countries, YAML + CLI configuration
//! ├── proxy/      – TLS listener, host routing, forwarding, rewriting
//! └── updater     – executable hash check against the update server
//! ```

pub mod bancho;
pub mod config;
pub mod proxy;
pub mod updater;
