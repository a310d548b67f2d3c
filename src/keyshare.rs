// Copyright (c) Silence Laboratories Pte. Ltd. All Rights Reserved.
// This software is licensed under the Silence Laboratories License Agreement.

//! The long-lived output of a [`crate::keygen::KeygenSession`].

use k256::{AffinePoint, NonZeroScalar, Scalar};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sl_oblivious::soft_spoken::{ReceiverOTSeed, SenderOTSeed};
use zeroize::Zeroize;

use crate::{
    constants::KEYSHARE_COMMITMENT_LABEL,
    error::KeygenError,
    ids::{PartyId, ThresholdConfig},
    pairs::Pairs,
    utils::ZS,
};

/// A single party's share of a threshold ECDSA key.
///
/// Every per-peer field is a [`Pairs`] keyed by the peer's real
/// [`PartyId`], never by its position in a sorted list — a non-contiguous
/// id set (`{0, 2, 5}`) works exactly like a dense one (`{0, 1, 2}`). This
/// replaces the teacher's `Vec<T>` fields indexed by
/// `get_idx_from_id`/raw id, which silently corrupt lookups once ids stop
/// being small dense integers starting at zero.
#[derive(Clone, Serialize, Deserialize)]
pub struct Keyshare {
    pub config: ThresholdConfig,
    pub party_id: PartyId,
    pub public_key: AffinePoint,

    pub(crate) root_chain_code: [u8; 32],
    pub(crate) s_i: Scalar,
    pub(crate) x_i_list: Pairs<NonZeroScalar, PartyId>,
    pub(crate) big_s_list: Pairs<AffinePoint, PartyId>,
    pub(crate) seed_ot_receivers: Pairs<ZS<ReceiverOTSeed>, PartyId>,
    pub(crate) seed_ot_senders: Pairs<ZS<SenderOTSeed>, PartyId>,
    /// Seeds this party sent to peers with a greater id, keyed by recipient.
    pub(crate) sent_seed_list: Pairs<[u8; 32], PartyId>,
    /// Seeds this party received from peers with a lesser id, keyed by sender.
    pub(crate) rec_seed_list: Pairs<[u8; 32], PartyId>,
}

impl Keyshare {
    /// Finalize a key rotation: `self` is the freshly generated share,
    /// `old` is the share it's meant to replace. Succeeds only if both
    /// shares commit to the same public key `Q` — anything else means the
    /// rotation session diverged from the wallet it was supposed to rotate
    /// and `self` must not be adopted.
    ///
    /// The teacher's wasm wrapper makes this check a no-op
    /// (`finish_key_rotation` does nothing); that stub would let a rotation
    /// silently replace a wallet's key material with a share for a
    /// different key, so this reimplementation performs the real
    /// comparison instead of carrying the stub forward.
    pub fn finish_rotation(self, old: &Keyshare) -> Result<Keyshare, KeygenError> {
        if self.public_key != old.public_key {
            return Err(KeygenError::RotationMismatch);
        }
        Ok(self)
    }

    /// `SHA-256` commitment to this keyshare's public identity: threshold
    /// config, party id, public key, and chain code, in that order, under a
    /// domain-separation label.
    ///
    /// Deliberately excludes `s_i` and every OT-derived field — committing
    /// to secret material in a value meant for public comparison would leak
    /// it. Two keyshares from the same keygen (or the same rotation) always
    /// commit identically; two keyshares for different parties, or for
    /// different keys, never collide outside of a `SHA-256` break.
    pub fn commitment(&self) -> [u8; 32] {
        let mut encoded = Vec::new();
        ciborium::into_writer(
            &(&self.config, self.party_id, self.public_key, self.root_chain_code),
            &mut encoded,
        )
        .expect("in-memory buffer write cannot fail");

        let mut hasher = Sha256::new();
        hasher.update(KEYSHARE_COMMITMENT_LABEL);
        hasher.update(encoded);
        hasher.finalize().into()
    }
}

impl Drop for Keyshare {
    fn drop(&mut self) {
        self.s_i.zeroize();
        self.seed_ot_receivers.zeroize_values();
        self.seed_ot_senders.zeroize_values();
        self.sent_seed_list.zeroize_values();
        self.rec_seed_list.zeroize_values();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keygen::tests::run_keygen;

    fn one_keyshare() -> Keyshare {
        let config = ThresholdConfig::new(2, 2).unwrap();
        run_keygen(config).swap_remove(0)
    }

    #[test]
    fn serde_round_trip_preserves_identity() {
        let share = one_keyshare();

        let mut bytes = Vec::new();
        ciborium::into_writer(&share, &mut bytes).unwrap();
        let restored: Keyshare = ciborium::from_reader(bytes.as_slice()).unwrap();

        assert_eq!(restored.config, share.config);
        assert_eq!(restored.party_id, share.party_id);
        assert_eq!(restored.public_key, share.public_key);
        assert_eq!(restored.root_chain_code, share.root_chain_code);
        assert_eq!(restored.commitment(), share.commitment());
    }

    #[test]
    fn commitment_is_stable_and_differs_across_parties() {
        let share = one_keyshare();
        assert_eq!(share.commitment(), share.commitment());

        let other = one_keyshare();
        assert_ne!(
            share.commitment(),
            other.commitment(),
            "shares from distinct keygens must not collide"
        );
    }
}
