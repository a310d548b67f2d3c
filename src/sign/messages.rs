// Copyright (c) Silence Laboratories Pte. Ltd. All Rights Reserved.
// This software is licensed under the Silence Laboratories License Agreement.

//! Round message types, pre-signature and partial-signature for threshold signing.

use k256::{AffinePoint, Scalar};
use serde::{Deserialize, Serialize};
use sl_oblivious::{rvole::RVOLEOutput, soft_spoken::Round1Output};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{ids::PartyId, utils::ZS, wire::MessageRouting};

/// Round 1, broadcast: session id and commitment to this party's nonce point.
#[derive(Clone, Serialize, Deserialize)]
pub struct SignMsg1 {
    pub from_id: PartyId,
    pub session_id: [u8; 32],
    pub commitment_r_i: [u8; 32],
}

impl MessageRouting for SignMsg1 {
    fn src_party_id(&self) -> PartyId {
        self.from_id
    }

    fn dst_party_id(&self) -> Option<PartyId> {
        None
    }
}

/// Round 2, peer-to-peer: first MtA (RVOLE) message.
#[derive(Clone, Serialize, Deserialize)]
pub struct SignMsg2 {
    pub from_id: PartyId,
    pub to_id: PartyId,
    pub final_session_id: [u8; 32],
    pub(crate) mta_msg_1: ZS<Round1Output>,
}

impl MessageRouting for SignMsg2 {
    fn src_party_id(&self) -> PartyId {
        self.from_id
    }

    fn dst_party_id(&self) -> Option<PartyId> {
        Some(self.to_id)
    }
}

/// Round 3, peer-to-peer: MtA response plus the nonce-point opening and
/// Gamma-MtA consistency material.
#[derive(Clone, Serialize, Deserialize)]
pub struct SignMsg3 {
    pub from_id: PartyId,
    pub to_id: PartyId,
    pub(crate) mta_msg2: ZS<RVOLEOutput>,
    pub digest_i: [u8; 32],
    pub pk_i: AffinePoint,
    pub big_r_i: AffinePoint,
    pub blind_factor: [u8; 32],
    pub gamma_v: AffinePoint,
    pub gamma_u: AffinePoint,
    pub psi: Scalar,
}

impl MessageRouting for SignMsg3 {
    fn src_party_id(&self) -> PartyId {
        self.from_id
    }

    fn dst_party_id(&self) -> Option<PartyId> {
        Some(self.to_id)
    }
}

/// Round 4, broadcast: this party's share of the final signature scalars,
/// produced only after a message digest is supplied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignMsg4 {
    pub from_id: PartyId,
    pub session_id: [u8; 32],
    pub s_0: Scalar,
    pub s_1: Scalar,
}

impl MessageRouting for SignMsg4 {
    fn src_party_id(&self) -> PartyId {
        self.from_id
    }

    fn dst_party_id(&self) -> Option<PartyId> {
        None
    }
}

/// The result of the (message-independent) pre-signature rounds for one
/// party. Must be consumed exactly once via [`crate::sign::SignSession`]'s
/// one-shot ledger enforcement — reusing it against two different digests
/// would leak the signing key.
#[derive(Zeroize, ZeroizeOnDrop, Serialize, Deserialize)]
pub struct PreSignature {
    pub from_id: PartyId,
    pub final_session_id: [u8; 32],
    pub public_key: AffinePoint,
    pub s_0: Scalar,
    pub s_1: Scalar,
    pub r: AffinePoint,
    pub phi_i: Scalar,
}

/// This party's share of a signature over a specific message digest.
#[derive(Zeroize, ZeroizeOnDrop, Serialize, Deserialize)]
pub struct PartialSignature {
    pub party_id: PartyId,
    pub final_session_id: [u8; 32],
    pub public_key: AffinePoint,
    pub message_hash: [u8; 32],
    pub s_0: Scalar,
    pub s_1: Scalar,
    pub r: AffinePoint,
}
