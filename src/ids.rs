// Copyright (c) Silence Laboratories Pte. Ltd. All Rights Reserved.
// This software is licensed under the Silence Laboratories License Agreement.

//! Party identifiers and the threshold configuration they're validated against.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// A nonnegative integer uniquely identifying a participant within a session.
///
/// Ids need not be contiguous (`{0, 2, 5}` is a legal id set for `n = 3`) but
/// must be distinct within a session and stable across rounds. Every
/// per-peer data structure in this crate looks peers up by this id, never by
/// their position in a sorted list — see [`ThresholdConfig::position`] for
/// the one place a stable position is derived, and only for sizing
/// fixed-capacity buffers.
pub type PartyId = u8;

/// Validated `(n, t, ids)` triple shared by every session in a wallet.
///
/// Constructing a `ThresholdConfig` is the only place `spec.md`'s
/// configuration invariants are checked; once built, every other type in
/// this crate can assume `2 <= t <= n` and that `ids` are distinct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdConfig {
    t: u8,
    ids: Vec<PartyId>,
}

impl ThresholdConfig {
    /// Build a configuration from a total-party-count `n` and threshold `t`,
    /// assigning ids `0..n` (the common case: a fresh wallet with no prior
    /// identity requirements).
    pub fn new(n: u8, t: u8) -> Result<Self, ConfigError> {
        Self::with_ids((0..n).collect(), t)
    }

    /// Build a configuration from an explicit, possibly non-contiguous, set
    /// of party ids.
    pub fn with_ids(
        mut ids: Vec<PartyId>,
        t: u8,
    ) -> Result<Self, ConfigError> {
        let n = ids.len();
        if n < 2 || n > u8::MAX as usize {
            return Err(ConfigError::ConfigInvalid);
        }
        if t < 2 || (t as usize) > n {
            return Err(ConfigError::ConfigInvalid);
        }

        let unique: BTreeSet<PartyId> = ids.iter().copied().collect();
        if unique.len() != n {
            return Err(ConfigError::PartyIdDuplicate);
        }

        ids.sort_unstable();

        Ok(Self { t, ids })
    }

    /// Total number of parties, `n`.
    pub fn n(&self) -> u8 {
        self.ids.len() as u8
    }

    /// Signing threshold, `t`.
    pub fn t(&self) -> u8 {
        self.t
    }

    /// The configured party ids, sorted ascending.
    pub fn ids(&self) -> &[PartyId] {
        &self.ids
    }

    /// `true` if `id` is one of this configuration's parties.
    pub fn contains(&self, id: PartyId) -> bool {
        self.ids.binary_search(&id).is_ok()
    }

    /// Fail with [`ConfigError::PartyIdUnknown`] unless `id` belongs to this
    /// configuration.
    pub fn require(&self, id: PartyId) -> Result<(), ConfigError> {
        self.contains(id)
            .then_some(())
            .ok_or(ConfigError::PartyIdUnknown)
    }

    /// The stable 0-based position of `id` among the sorted id set.
    ///
    /// Used only to size or index fixed-capacity scratch buffers (for
    /// example "the `t-1` peer slots"); never used as a substitute for the
    /// peer's real id when looking up or storing per-peer secret material —
    /// those lookups always go through the peer's actual [`PartyId`], kept
    /// in id-keyed structures such as [`crate::pairs::Pairs`]. Treating a
    /// position as if it were the id is the exact mistake `spec.md` calls
    /// out as silently corrupting keygen when ids are non-contiguous.
    pub fn position(&self, id: PartyId) -> Option<usize> {
        self.ids.binary_search(&id).ok()
    }

    /// Every configured id other than `id`.
    pub fn other_ids(&self, id: PartyId) -> impl Iterator<Item = PartyId> + '_ {
        self.ids.iter().copied().filter(move |p| *p != id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_threshold() {
        assert_eq!(ThresholdConfig::new(3, 1), Err(ConfigError::ConfigInvalid));
        assert_eq!(ThresholdConfig::new(3, 4), Err(ConfigError::ConfigInvalid));
        assert_eq!(ThresholdConfig::new(1, 2), Err(ConfigError::ConfigInvalid));
    }

    #[test]
    fn rejects_duplicate_ids() {
        assert_eq!(
            ThresholdConfig::with_ids(vec![0, 1, 1], 2),
            Err(ConfigError::PartyIdDuplicate)
        );
    }

    #[test]
    fn non_contiguous_ids_round_trip_positions() {
        let cfg = ThresholdConfig::with_ids(vec![5, 0, 2], 2).unwrap();
        assert_eq!(cfg.ids(), &[0, 2, 5]);
        assert_eq!(cfg.position(0), Some(0));
        assert_eq!(cfg.position(2), Some(1));
        assert_eq!(cfg.position(5), Some(2));
        assert_eq!(cfg.position(3), None);
        assert_eq!(cfg.other_ids(2).collect::<Vec<_>>(), vec![0, 5]);
    }
}
