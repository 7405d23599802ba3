/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Maps bancho session tokens to user ids.
//!
//! The login response carries the token in a `cho-token` header together
//! with a `LoginReply` packet holding the user id.  Every later poll sends
//! the token back as `osu-token`, which is how the rewriter knows whose
//! presence belongs to the local player.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use tracing::debug;

/// Header set by the server on a successful login.
pub const LOGIN_TOKEN_HEADER: &str = "cho-token";
/// Header sent by the client on every subsequent bancho request.
pub const SESSION_TOKEN_HEADER: &str = "osu-token";

/// Upper bound on remembered sessions.  A local proxy normally serves one
/// player; the bound only stops repeated re-logins from growing the map.
const MAX_SESSIONS: usize = 64;

#[derive(Debug, Default)]
pub struct SessionTracker {
    sessions: Mutex<HashMap<String, i32>>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember `token → user_id`.  Non-positive ids (failed logins) are
    /// ignored.
    pub fn register(&self, token: &str, user_id: i32) {
        if user_id <= 0 || token.is_empty() {
            return;
        }
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        if sessions.len() >= MAX_SESSIONS && !sessions.contains_key(token) {
            if let Some(evict) = sessions.keys().next().cloned() {
                sessions.remove(&evict);
            }
        }
        sessions.insert(token.to_owned(), user_id);
        debug!(user_id, active = sessions.len(), "Registered bancho session");
    }

    pub fn lookup(&self, token: &str) -> Option<i32> {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(token)
            .copied()
    }

    pub fn len(&self) -> usize {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
