// Copyright (c) Silence Laboratories Pte. Ltd. All Rights Reserved.
// This software is licensed under the Silence Laboratories License Agreement.

//! Round message types for the keygen protocol.

use k256::{AffinePoint, NonZeroScalar, Scalar, Secp256k1};
use serde::{Deserialize, Serialize};
use sl_mpc_mate::math::GroupPolynomial;
use sl_oblivious::{
    endemic_ot::EndemicOTMsg1,
    endemic_ot::EndemicOTMsg2,
    soft_spoken::PPRFOutput,
    zkproofs::DLogProof,
};

use crate::{ids::PartyId, utils::ZS, wire::MessageRouting};

/// Round 1, broadcast: session id, commitment to this party's share, and
/// public evaluation point `x_i`.
#[derive(Clone, Serialize, Deserialize)]
pub struct KeygenMsg1 {
    pub from_id: PartyId,
    pub session_id: [u8; 32],
    pub commitment: [u8; 32],
    pub x_i: NonZeroScalar,
}

impl MessageRouting for KeygenMsg1 {
    fn src_party_id(&self) -> PartyId {
        self.from_id
    }

    fn dst_party_id(&self) -> Option<PartyId> {
        None
    }
}

/// Round 2, peer-to-peer: base OT message plus this party's broadcast
/// commitments-opening material (polynomial commitment, random nonce,
/// DLog proofs).
#[derive(Clone, Serialize, Deserialize)]
pub struct KeygenMsg2 {
    pub from_id: PartyId,
    pub to_id: PartyId,

    pub(crate) ot: ZS<EndemicOTMsg1>,

    pub(crate) big_f_i_vec: GroupPolynomial<Secp256k1>,
    pub(crate) r_i: [u8; 32],
    pub(crate) dlog_proofs: Vec<DLogProof>,
}

impl MessageRouting for KeygenMsg2 {
    fn src_party_id(&self) -> PartyId {
        self.from_id
    }

    fn dst_party_id(&self) -> Option<PartyId> {
        Some(self.to_id)
    }
}

/// Round 3, peer-to-peer: base OT response, PPRF outputs, the combined
/// polynomial, this party's share of the peer's secret, and chain-code
/// commitment material.
#[derive(Clone, Serialize, Deserialize)]
pub struct KeygenMsg3 {
    pub from_id: PartyId,
    pub to_id: PartyId,

    pub(crate) big_f_vec: GroupPolynomial<Secp256k1>,
    pub(crate) d_i: Scalar,
    pub(crate) base_ot_msg2: ZS<EndemicOTMsg2>,
    pub(crate) pprf_output: ZS<PPRFOutput>,
    pub(crate) seed_i_j: Option<[u8; 32]>,
    pub(crate) chain_code_sid: [u8; 32],
    pub(crate) r_i_2: [u8; 32],
}

impl MessageRouting for KeygenMsg3 {
    fn src_party_id(&self) -> PartyId {
        self.from_id
    }

    fn dst_party_id(&self) -> Option<PartyId> {
        Some(self.to_id)
    }
}

/// Round 4, broadcast: the final public key, this party's public share
/// point, and a DLog proof of knowledge of its exponent.
#[derive(Clone, Serialize, Deserialize)]
pub struct KeygenMsg4 {
    pub from_id: PartyId,

    pub(crate) public_key: AffinePoint,
    pub(crate) big_s_i: AffinePoint,
    pub(crate) proof: DLogProof,
}

impl MessageRouting for KeygenMsg4 {
    fn src_party_id(&self) -> PartyId {
        self.from_id
    }

    fn dst_party_id(&self) -> Option<PartyId> {
        None
    }
}
