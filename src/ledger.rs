// Copyright (c) Silence Laboratories Pte. Ltd. All Rights Reserved.
// This software is licensed under the Silence Laboratories License Agreement.

//! Process-wide spent-session ledger enforcing one-shot presignature use.
//!
//! The teacher's wasm wrapper only prevents a [`crate::sign::SignSession`]
//! from producing two partial signatures through its own linear `Round`
//! state transitions — but that session can be serialized mid-protocol
//! (the wrapper exposes exactly this via `to_bytes`/`from_bytes`) and
//! resurrected from the same bytes twice, each copy willing to call
//! `last_message` once. Since a DKLS presignature leaks the secret key if
//! it ever signs two different digests, that gap is a key-leak primitive,
//! not a quality-of-life bug. This ledger closes it: every
//! [`crate::sign::SignSession`] is assigned a random token at construction,
//! and `last_message` checks-and-inserts that token into a process-wide set
//! before it touches any presignature state, so however many copies of a
//! session a party resurrects, at most one of them completes.
//!
//! `std::sync::{Mutex, OnceLock}` are used rather than a crate like
//! `once_cell` or `parking_lot` — neither appears anywhere in the corpus
//! this crate is grounded on, and a single lazily-initialized global set is
//! exactly what the standard library's own primitives are for.

use std::{
    collections::HashSet,
    sync::{Mutex, OnceLock},
};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque, random per-session token. Not derived from session contents —
/// two sessions built from identical inputs still get distinct tokens,
/// and a session resurrected from serialized bytes keeps the token it was
/// built with, which is exactly the property the ledger needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionToken(Uuid);

impl SessionToken {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionToken {
    fn default() -> Self {
        Self::new()
    }
}

fn ledger() -> &'static Mutex<HashSet<SessionToken>> {
    static LEDGER: OnceLock<Mutex<HashSet<SessionToken>>> = OnceLock::new();
    LEDGER.get_or_init(|| Mutex::new(HashSet::new()))
}

/// Atomically mark `token` spent. Returns `true` the first time a given
/// token is spent, `false` on every subsequent attempt (including attempts
/// from a different in-memory `SignSession` instance holding the same
/// token after a serialize/deserialize round trip).
pub fn spend(token: SessionToken) -> bool {
    let mut guard = ledger().lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    guard.insert(token)
}

/// `true` if `token` has already been spent.
pub fn is_spent(token: SessionToken) -> bool {
    let guard = ledger().lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    guard.contains(&token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_tokens_are_distinct() {
        let a = SessionToken::new();
        let b = SessionToken::new();
        assert_ne!(a, b);
    }

    #[test]
    fn spend_is_one_shot_across_clones() {
        let token = SessionToken::new();
        assert!(!is_spent(token));
        assert!(spend(token));
        assert!(is_spent(token));

        // A "resurrected" clone of the same token (e.g. from a serialized
        // duplicate session) cannot spend again.
        let resurrected = token;
        assert!(!spend(resurrected));
    }

    #[test]
    fn distinct_tokens_do_not_interfere() {
        let a = SessionToken::new();
        let b = SessionToken::new();
        assert!(spend(a));
        assert!(spend(b));
        assert!(!spend(a));
        assert!(!spend(b));
    }
}
