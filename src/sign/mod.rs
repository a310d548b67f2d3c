// Copyright (c) Silence Laboratories Pte. Ltd. All Rights Reserved.
// This software is licensed under the Silence Laboratories License Agreement.

//! Threshold signing (Component C).
//!
//! The MtA/RVOLE exchange, commitment scheme, and `combine_partial_signature`
//! consistency checks are carried from the teacher's `dsg.rs`. As in
//! [`crate::keygen`], what changes is indexing — every per-peer lookup goes
//! through [`crate::pairs::Pairs`] keyed by the peer's real
//! [`PartyId`][crate::ids::PartyId] rather than `get_idx_from_id`'s raw-id
//! array position — and the one-shot presignature invariant `spec.md` §3/§5
//! calls out, which the teacher's `Round` enum alone cannot enforce against
//! a serialized-and-resurrected session. See [`crate::ledger`] for that.

mod messages;

pub use messages::{PartialSignature, PreSignature, SignMsg1, SignMsg2, SignMsg3, SignMsg4};

use std::str::FromStr;

use derivation_path::DerivationPath;
use k256::{
    ecdsa::{signature::hazmat::PrehashVerifier, Signature, VerifyingKey},
    elliptic_curve::{ops::Reduce, point::AffineCoordinates, subtle::ConstantTimeEq, PrimeField},
    AffinePoint, ProjectivePoint, Scalar, U256,
};
use rand::prelude::*;
use sha2::{Digest, Sha256};
use sl_mpc_mate::bip32::{derive_child_pubkey, BIP32Error};
use sl_oblivious::{
    rvole::{RVOLEOutput, RVOLEReceiver, RVOLESender},
    soft_spoken::Round1Output,
};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{
    constants::*,
    error::SignError,
    ids::{PartyId, ThresholdConfig},
    keyshare::Keyshare,
    ledger::{self, SessionToken},
    pairs::Pairs,
    utils::*,
    wire::Frame,
};

/// Get the additive offset and public key for a BIP32 derivation path,
/// relative to `public_key`/`root_chain_code`. Carried unchanged from the
/// teacher's `dsg.rs`; `SignSession::new` only ever calls it with the
/// identity path (an empty iterator), so `additive_offset` is always
/// `Scalar::ZERO` and `derive_child_pubkey` is never actually invoked today
/// — kept general, per `spec.md` §9, for when the `"m"`-only restriction
/// lifts.
fn derive_with_offset(
    public_key: &ProjectivePoint,
    root_chain_code: &[u8; 32],
    chain_path: &DerivationPath,
) -> Result<(Scalar, ProjectivePoint), BIP32Error> {
    let mut pubkey = *public_key;
    let mut chain_code = *root_chain_code;
    let mut additive_offset = Scalar::ZERO;
    for child_num in chain_path {
        let (il_int, child_pubkey, child_chain_code) =
            derive_child_pubkey(&pubkey, chain_code, child_num)?;
        pubkey = child_pubkey;
        chain_code = child_chain_code;
        additive_offset += il_int;
    }
    Ok((additive_offset, pubkey))
}

/// This party's additive share of the ECDSA nonce `zeta_i`, derived from the
/// OT seeds exchanged during keygen. Replaces the teacher's
/// `keyshare.rec_seed_list[p as usize]` / `sent_seed_list[p - party_id - 1]`
/// position arithmetic with direct [`PartyId`]-keyed lookups — correct
/// regardless of whether ids are dense or sparse (`spec.md` §9's Open
/// Question).
fn get_zeta_i(
    keyshare: &Keyshare,
    party_id: PartyId,
    sig_id: &[u8; 32],
    parties: impl Iterator<Item = PartyId>,
) -> Scalar {
    let mut p_0_list = Vec::new();
    let mut p_1_list = Vec::new();

    for other in parties {
        if other < party_id {
            p_0_list.push(other);
        } else if other > party_id {
            p_1_list.push(other);
        }
    }

    let mut sum_p_0 = Scalar::ZERO;
    for p_0_party in &p_0_list {
        let seed_j_i = keyshare.rec_seed_list.find_pair(*p_0_party);
        let mut hasher = Sha256::new();
        hasher.update(seed_j_i);
        hasher.update(sig_id);
        sum_p_0 += Scalar::reduce(U256::from_be_slice(&hasher.finalize()));
    }

    let mut sum_p_1 = Scalar::ZERO;
    for p_1_party in &p_1_list {
        let seed_i_j = keyshare.sent_seed_list.find_pair(*p_1_party);
        let mut hasher = Sha256::new();
        hasher.update(seed_i_j);
        hasher.update(sig_id);
        sum_p_1 += Scalar::reduce(U256::from_be_slice(&hasher.finalize()));
    }

    sum_p_0 - sum_p_1
}

/// Lagrange coefficient for `party_id` over the signer set `{party_id} ∪
/// parties`. `spec.md` never asks for weighted (Birkhoff) shares, so unlike
/// the teacher this has no unreachable rank-weighted branch to carry.
fn get_lagrange_coeff(
    keyshare: &Keyshare,
    party_id: PartyId,
    parties: impl Iterator<Item = PartyId>,
) -> Scalar {
    let mut coeff = Scalar::from(1u64);
    let x_i = &*keyshare.x_i_list.find_pair(party_id);

    for other in parties {
        let x_j = &*keyshare.x_i_list.find_pair(other);
        if x_i.ct_ne(x_j).into() {
            let sub = x_j - x_i;
            coeff *= x_j * &sub.invert().unwrap();
        }
    }

    coeff
}

/// One party's mutable state across the three pre-signature rounds.
/// Consumes the [`Keyshare`] handed to [`SignSession::new`] — matching
/// `spec.md` §4.C's "consumes the keyshare" contract and the teacher's
/// `State` owning its `Keyshare` by value.
struct Engine {
    party_id: PartyId,
    config: ThresholdConfig,
    keyshare: Keyshare,

    sid_list: Pairs<[u8; 32], PartyId>,
    phi_i: Scalar,
    r_i: Scalar,
    sk_i: Scalar,
    big_r_i: AffinePoint,
    pk_i: AffinePoint,
    blind_factor: [u8; 32],
    commitment_r_i_list: Pairs<[u8; 32], PartyId>,
    final_session_id: [u8; 32],
    digest_i: [u8; 32],
    mta_receiver_list: Pairs<(ZS<RVOLEReceiver>, Scalar), PartyId>,
    additive_offset: Scalar,
    derived_public_key: AffinePoint,
    sender_additive_shares: Vec<[Scalar; 2]>,
}

impl Engine {
    fn new<R: RngCore + CryptoRng>(
        rng: &mut R,
        keyshare: Keyshare,
        chain_path: &DerivationPath,
    ) -> Result<Self, SignError> {
        let party_id = keyshare.party_id;
        let config = keyshare.config.clone();

        let session_id: [u8; 32] = rng.gen();
        let phi_i = Scalar::generate_biased(rng);
        let r_i = Scalar::generate_biased(rng);
        let blind_factor = rng.gen();

        let big_r_i = ProjectivePoint::GENERATOR * r_i;
        let commitment_r_i = hash_commitment_r_i(&session_id, &big_r_i, &blind_factor);

        let (additive_offset, derived_public_key) = derive_with_offset(
            &keyshare.public_key.to_curve(),
            &keyshare.root_chain_code,
            chain_path,
        )
        .map_err(|e| SignError::Derivation(format!("{e:?}")))?;

        // Cannot fail: t >= 2 is a ThresholdConfig invariant.
        let threshold_inv = Scalar::from(config.t() as u32).invert().unwrap();
        let additive_offset = additive_offset * threshold_inv;

        Ok(Self {
            sender_additive_shares: Vec::with_capacity(config.t() as usize - 1),
            party_id,
            sid_list: Pairs::new_with_item(party_id, session_id),
            phi_i,
            r_i,
            sk_i: Scalar::ZERO,
            big_r_i: big_r_i.to_affine(),
            pk_i: AffinePoint::IDENTITY,
            blind_factor,
            additive_offset,
            derived_public_key: derived_public_key.to_affine(),
            commitment_r_i_list: Pairs::new_with_item(party_id, commitment_r_i),
            final_session_id: [0u8; 32],
            digest_i: [0; 32],
            mta_receiver_list: Pairs::new(),
            config,
            keyshare,
        })
    }

    fn generate_msg1(&self) -> SignMsg1 {
        SignMsg1 {
            from_id: self.party_id,
            session_id: *self.sid_list.find_pair(self.party_id),
            commitment_r_i: *self.commitment_r_i_list.find_pair(self.party_id),
        }
    }

    #[tracing::instrument(level = "debug", skip_all, fields(party_id = self.party_id))]
    fn handle_msg1<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
        msgs: Vec<SignMsg1>,
    ) -> Result<Vec<SignMsg2>, SignError> {
        let expected = self.config.t() as usize - 1;
        if msgs.len() != expected {
            return Err(SignError::MissingMessage);
        }

        for msg in msgs {
            self.sid_list.push(msg.from_id, msg.session_id);
            self.commitment_r_i_list.push(msg.from_id, msg.commitment_r_i);
        }

        self.final_session_id = self
            .sid_list
            .iter()
            .fold(Sha256::new(), |hash, (_, sid)| hash.chain_update(sid))
            .finalize()
            .into();

        self.digest_i = {
            let mut h = Sha256::new();
            for (key, commitment_i) in self.commitment_r_i_list.iter() {
                h.update((*key as u32).to_be_bytes());
                h.update(self.sid_list.find_pair(*key));
                h.update(commitment_i);
            }
            h.finalize().into()
        };

        let party_id = self.party_id;

        self.config
            .other_ids(party_id)
            .map(|sender_id| {
                let sid = mta_session_id(&self.final_session_id, sender_id, party_id);
                let sender_ot_results = self.keyshare.seed_ot_senders.find_pair(sender_id);

                let mut mta_msg_1 = ZS::<Round1Output>::default();
                let (mta_receiver, chi_i_j) =
                    RVOLEReceiver::new(sid, sender_ot_results, &mut mta_msg_1, rng);

                self.mta_receiver_list.push(sender_id, (mta_receiver.into(), chi_i_j));

                Ok(SignMsg2 {
                    from_id: party_id,
                    to_id: sender_id,
                    final_session_id: self.final_session_id,
                    mta_msg_1,
                })
            })
            .collect()
    }

    #[tracing::instrument(level = "debug", skip_all, fields(party_id = self.party_id))]
    fn handle_msg2<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
        msgs: Vec<SignMsg2>,
    ) -> Result<Vec<SignMsg3>, SignError> {
        let expected = self.config.t() as usize - 1;
        if msgs.len() != expected {
            return Err(SignError::MissingMessage);
        }

        let my_party_id = self.party_id;

        let zeta_i = get_zeta_i(
            &self.keyshare,
            my_party_id,
            &self.digest_i,
            self.config.other_ids(my_party_id),
        );
        let coeff = get_lagrange_coeff(&self.keyshare, my_party_id, self.config.other_ids(my_party_id));

        self.sk_i = coeff * self.keyshare.s_i + self.additive_offset + zeta_i;
        self.pk_i = (ProjectivePoint::GENERATOR * self.sk_i).to_affine();

        msgs.into_iter()
            .map(|msg| {
                if msg.final_session_id.ct_ne(&self.final_session_id).into() {
                    return Err(SignError::InvalidFinalSessionID);
                }

                let party_id = msg.from_id;
                let sid = mta_session_id(&self.final_session_id, my_party_id, party_id);
                let seed_ot_results = self.keyshare.seed_ot_receivers.find_pair(party_id);

                let mut mta_msg2 = ZS::<RVOLEOutput>::default();
                let [c_u, c_v] = RVOLESender::process(
                    &sid,
                    seed_ot_results,
                    &[self.r_i, self.sk_i],
                    &msg.mta_msg_1,
                    &mut mta_msg2,
                    rng,
                )
                .map_err(|_| SignError::AbortProtocolAndBanParty(party_id))?;

                let gamma_u = ProjectivePoint::GENERATOR * c_u;
                let gamma_v = ProjectivePoint::GENERATOR * c_v;
                let (_mta_receiver, chi_i_j) = self.mta_receiver_list.find_pair(party_id);
                let psi = self.phi_i - chi_i_j;

                self.sender_additive_shares.push([c_u, c_v]);

                Ok(SignMsg3 {
                    from_id: my_party_id,
                    to_id: party_id,
                    mta_msg2,
                    digest_i: self.digest_i,
                    pk_i: self.pk_i,
                    big_r_i: self.big_r_i,
                    blind_factor: self.blind_factor,
                    gamma_v: gamma_v.to_affine(),
                    gamma_u: gamma_u.to_affine(),
                    psi,
                })
            })
            .collect()
    }

    #[tracing::instrument(level = "debug", skip_all, fields(party_id = self.party_id))]
    fn handle_msg3(&mut self, msgs: Vec<SignMsg3>) -> Result<PreSignature, SignError> {
        let expected = self.config.t() as usize - 1;
        if msgs.len() != expected {
            return Err(SignError::MissingMessage);
        }

        let mut big_r_star = ProjectivePoint::IDENTITY;
        let mut sum_pk_j = ProjectivePoint::IDENTITY;
        let mut sum_psi_j_i = Scalar::ZERO;
        let mut receiver_additive_shares = vec![];

        for msg3 in msgs {
            let party_id = msg3.from_id;
            let (mta_receiver, chi_i_j) = self.mta_receiver_list.pop_pair(party_id);

            let [d_u, d_v] = mta_receiver
                .process(&msg3.mta_msg2)
                .map_err(|_| SignError::AbortProtocolAndBanParty(party_id))?;

            receiver_additive_shares.push([d_u, d_v]);

            let commitment = self.commitment_r_i_list.find_pair(party_id);
            let sid_i = self.sid_list.find_pair(party_id);

            if !verify_commitment_r_i(sid_i, &msg3.big_r_i.to_curve(), &msg3.blind_factor, commitment) {
                return Err(SignError::InvalidCommitment);
            }
            if self.digest_i.ct_ne(&msg3.digest_i).into() {
                return Err(SignError::InvalidDigest);
            }

            let big_r_j = msg3.big_r_i.to_curve();
            let pk_j = msg3.pk_i.to_curve();

            big_r_star += big_r_j;
            sum_pk_j += pk_j;
            sum_psi_j_i += &msg3.psi;

            if (big_r_j * chi_i_j) != (ProjectivePoint::GENERATOR * d_u + msg3.gamma_u) {
                return Err(SignError::AbortProtocolAndBanParty(party_id));
            }
            if (pk_j * chi_i_j) != (ProjectivePoint::GENERATOR * d_v + msg3.gamma_v) {
                return Err(SignError::AbortProtocolAndBanParty(party_id));
            }
        }

        let big_r = big_r_star + self.big_r_i;
        sum_pk_j += self.pk_i;

        if sum_pk_j != self.derived_public_key {
            return Err(SignError::FailedCheck("partial public key sum mismatch"));
        }

        let mut sum_v = Scalar::ZERO;
        let mut sum_u = Scalar::ZERO;
        for (sender_shares, receiver_shares) in
            self.sender_additive_shares.iter().zip(receiver_additive_shares.iter())
        {
            sum_u += sender_shares[0] + receiver_shares[0];
            sum_v += sender_shares[1] + receiver_shares[1];
        }

        let r_point = big_r.to_affine();
        let r_x = Scalar::from_repr(r_point.x()).unwrap();
        let phi_plus_sum_psi = self.phi_i + sum_psi_j_i;
        let s_0 = r_x * (self.sk_i * phi_plus_sum_psi + sum_v);
        let s_1 = self.r_i * phi_plus_sum_psi + sum_u;

        Ok(PreSignature {
            from_id: self.party_id,
            final_session_id: self.final_session_id,
            public_key: self.derived_public_key,
            phi_i: self.phi_i,
            r: big_r.to_affine(),
            s_0,
            s_1,
        })
    }
}

/// Derive this party's share of the final signature scalars over `digest`
/// from its presignature. Consumes `pre` — a presignature must be used for
/// exactly one digest, and consuming it here makes reuse a type error at
/// every call site except [`SignSession::last_message`], which is itself
/// guarded by the one-shot ledger.
fn create_partial_signature(pre: PreSignature, digest: [u8; 32]) -> (PartialSignature, SignMsg4) {
    let m = Scalar::reduce(U256::from_be_slice(&digest));
    let s_0 = m * pre.phi_i + pre.s_0;

    let partial = PartialSignature {
        party_id: pre.from_id,
        final_session_id: pre.final_session_id,
        public_key: pre.public_key,
        message_hash: digest,
        s_0,
        s_1: pre.s_1,
        r: pre.r,
    };

    let msg4 = SignMsg4 {
        from_id: pre.from_id,
        session_id: partial.final_session_id,
        s_0: partial.s_0,
        s_1: partial.s_1,
    };

    (partial, msg4)
}

/// Scratch copy of a partial signature's scalars in projective form, used
/// only inside [`combine_partial_signature`]. Zeroized on drop like the
/// teacher's own `PS`, even though `r`/`public_key`/`message_hash` are not
/// secret — the scalars `s_0`/`s_1` are shares of the final signature's
/// nonce-blinded secret key and warrant it.
#[derive(Zeroize, ZeroizeOnDrop)]
struct PS {
    final_session_id: [u8; 32],
    public_key: ProjectivePoint,
    message_hash: [u8; 32],
    s_0: Scalar,
    s_1: Scalar,
    r: ProjectivePoint,
}

fn combine_partial_signature(partials: Vec<PS>) -> Result<Signature, SignError> {
    let final_session_id = partials[0].final_session_id;
    let public_key = partials[0].public_key;
    let message_hash = partials[0].message_hash;
    let r = partials[0].r;

    let mut sum_s_0 = Scalar::ZERO;
    let mut sum_s_1 = Scalar::ZERO;
    for partial in &partials {
        let mismatched = partial.final_session_id != final_session_id
            || partial.public_key != public_key
            || partial.r != r
            || partial.message_hash != message_hash;
        if mismatched {
            return Err(SignError::FailedCheck("inconsistent partial signatures"));
        }
        sum_s_0 += partial.s_0;
        sum_s_1 += partial.s_1;
    }

    let r_x = r.to_affine().x();
    let sum_s_1_inv = sum_s_1.invert().unwrap();
    let s = sum_s_0 * sum_s_1_inv;

    let sig = Signature::from_scalars(r_x, s)?;
    let sig = sig.normalize_s().unwrap_or(sig);

    VerifyingKey::from_affine(public_key.to_affine())?.verify_prehash(&message_hash, &sig)?;

    Ok(sig)
}

/// Combine this party's [`PartialSignature`] with peers' [`SignMsg4`]
/// frames into a single ECDSA signature, verifying it against `public_key`
/// before returning it.
fn combine_signatures(partial: PartialSignature, msgs: Vec<SignMsg4>) -> Result<Signature, SignError> {
    let mut partials = Vec::with_capacity(msgs.len() + 1);
    partials.push(PS {
        final_session_id: partial.final_session_id,
        public_key: partial.public_key.to_curve(),
        message_hash: partial.message_hash,
        s_0: partial.s_0,
        s_1: partial.s_1,
        r: partial.r.to_curve(),
    });
    for msg in msgs {
        partials.push(PS {
            final_session_id: msg.session_id,
            s_0: msg.s_0,
            s_1: msg.s_1,
            public_key: partial.public_key.to_curve(),
            message_hash: partial.message_hash,
            r: partial.r.to_curve(),
        });
    }
    combine_partial_signature(partials)
}

fn scalar_to_bytes32(s: Scalar) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&s.to_bytes());
    out
}

/// Which round a [`SignSession`] is waiting to process. The three
/// pre-signature rounds (`One..Three`) mirror the teacher's
/// `handle_msg1..3`; `AwaitingDigest`/`AwaitingCombine`/`Done` encode the
/// one-shot online round `spec.md` §3/§4.C treats as the load-bearing
/// safety property — there is no teacher equivalent for these last three,
/// since the teacher's wasm wrapper lets `last_message`/`combine` be called
/// in any order its own `Round` enum happens not to forbid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Round {
    One,
    Two,
    Three,
    AwaitingDigest,
    AwaitingCombine,
    Done,
}

/// A threshold-signing session in progress for one party, over one
/// digest, from one [`Keyshare`].
///
/// Move-only: [`SignSession::combine`] consumes `self`, so the Rust type
/// system already forbids calling it twice on the same in-memory handle.
/// The harder case — a party that serializes the session mid-protocol and
/// resurrects two copies, each willing to call `last_message` once — is
/// closed by [`crate::ledger`], not by this struct's own state.
pub struct SignSession {
    engine: Engine,
    round: Round,
    token: SessionToken,
    presignature: Option<PreSignature>,
    partial: Option<PartialSignature>,
}

impl SignSession {
    /// Start a signing session from `keyshare` (consumed) for the BIP32
    /// path `derivation_path`. Only the identity path `"m"` is supported
    /// today; anything else fails with [`SignError::DerivationUnsupported`]
    /// — see `spec.md` §4.C and §9.
    pub fn new(keyshare: Keyshare, derivation_path: &str) -> Result<Self, SignError> {
        let path =
            DerivationPath::from_str(derivation_path).map_err(|_| SignError::DerivationUnsupported)?;
        if path.into_iter().next().is_some() {
            return Err(SignError::DerivationUnsupported);
        }

        let mut rng = rand::thread_rng();
        let engine = Engine::new(&mut rng, keyshare, &path)?;

        Ok(Self {
            engine,
            round: Round::One,
            token: SessionToken::new(),
            presignature: None,
            partial: None,
        })
    }

    /// Build this party's round-1 pre-signature broadcast frame. Legal only
    /// as the session's very first call; once the pre-signature rounds have
    /// advanced (or the session has been spent), this fails rather than
    /// re-emitting a stale round-1 frame — the same one-shot discipline
    /// `spec.md` §4.C requires of `last_message`/`combine`.
    pub fn first_message(&mut self) -> Result<Frame, SignError> {
        if self.round != Round::One {
            return Err(SignError::SessionSpent);
        }
        Ok(Frame::new(&self.engine.generate_msg1()))
    }

    /// Advance through the three pre-signature rounds. Returns an empty
    /// batch once the third round closes — the presignature is held
    /// in-session until [`SignSession::last_message`] is called with a
    /// digest.
    #[tracing::instrument(level = "info", skip_all, fields(party_id = self.engine.party_id, round = ?self.round))]
    pub fn handle(&mut self, frames: Vec<Frame>) -> Result<Vec<Frame>, SignError> {
        let mut rng = rand::thread_rng();

        match self.round {
            Round::One => {
                let msgs = decode_all::<SignMsg1>(frames)?;
                let out = self.engine.handle_msg1(&mut rng, msgs)?;
                self.round = Round::Two;
                Ok(out.iter().map(Frame::new).collect())
            }
            Round::Two => {
                let msgs = decode_all::<SignMsg2>(frames)?;
                let out = self.engine.handle_msg2(&mut rng, msgs)?;
                self.round = Round::Three;
                Ok(out.iter().map(Frame::new).collect())
            }
            Round::Three => {
                let msgs = decode_all::<SignMsg3>(frames)?;
                let pre = self.engine.handle_msg3(msgs)?;
                self.presignature = Some(pre);
                self.round = Round::AwaitingDigest;
                tracing::debug!(party_id = self.engine.party_id, "presignature ready");
                Ok(vec![])
            }
            Round::AwaitingDigest | Round::AwaitingCombine | Round::Done => {
                tracing::warn!(party_id = self.engine.party_id, "handle called out of order");
                Err(SignError::SessionSpent)
            }
        }
    }

    /// The online round: sign `digest` (must be exactly 32 bytes) with the
    /// completed presignature. Legal exactly once, and only after
    /// [`SignSession::handle`] has closed the third pre-signature round.
    ///
    /// This is the one safety-critical call in the whole engine: it checks
    /// and marks this session's token spent in the process-wide
    /// [`crate::ledger`] *before* consuming the presignature, so a
    /// serialized-and-resurrected duplicate of this session can win that
    /// race at most once.
    pub fn last_message(&mut self, digest: &[u8]) -> Result<Frame, SignError> {
        if digest.len() != 32 {
            return Err(SignError::DigestLengthInvalid);
        }

        match self.round {
            Round::AwaitingDigest => {}
            Round::AwaitingCombine | Round::Done => return Err(SignError::SessionSpent),
            _ => return Err(SignError::SessionNotReady),
        }

        if !ledger::spend(self.token) {
            self.round = Round::Done;
            return Err(SignError::SessionSpent);
        }

        let pre = self.presignature.take().ok_or(SignError::SessionNotReady)?;
        let mut digest_bytes = [0u8; 32];
        digest_bytes.copy_from_slice(digest);

        let (partial, msg4) = create_partial_signature(pre, digest_bytes);
        self.partial = Some(partial);
        self.round = Round::AwaitingCombine;

        Ok(Frame::new(&msg4))
    }

    /// Combine peers' online-round frames with this party's own partial
    /// signature into `(r, s)`. Consumes the session — there is no value
    /// left to call `combine` or `last_message` on again.
    pub fn combine(mut self, frames: Vec<Frame>) -> Result<([u8; 32], [u8; 32]), SignError> {
        match self.round {
            Round::AwaitingCombine => {}
            Round::Done => return Err(SignError::SessionSpent),
            _ => return Err(SignError::SessionNotReady),
        }

        let msgs = decode_all::<SignMsg4>(frames)?;
        let partial = self.partial.take().ok_or(SignError::SessionNotReady)?;
        self.round = Round::Done;

        let sig = combine_signatures(partial, msgs)?;
        let r = scalar_to_bytes32(*sig.r());
        let s = scalar_to_bytes32(*sig.s());

        Ok((r, s))
    }
}

fn decode_all<T: serde::de::DeserializeOwned>(frames: Vec<Frame>) -> Result<Vec<T>, SignError> {
    frames
        .iter()
        .map(|f| f.decode::<T>().map_err(SignError::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ids::ThresholdConfig, keygen::tests::check_serde, wire::Router};

    fn run_keygen(config: ThresholdConfig) -> Vec<Keyshare> {
        crate::keygen::tests::run_keygen(config)
    }

    fn run_sign(shares: Vec<Keyshare>, digest: [u8; 32]) -> Vec<([u8; 32], [u8; 32])> {
        let ids: Vec<PartyId> = shares.iter().map(|s| s.party_id).collect();
        let mut sessions: Vec<SignSession> = shares
            .into_iter()
            .map(|s| SignSession::new(s, "m").unwrap())
            .collect();
        let mut routers: Vec<Router> = ids.iter().map(|_| Router::new()).collect();

        let msg1: Vec<Frame> = sessions.iter_mut().map(|s| s.first_message().unwrap()).collect();
        check_serde(&msg1);

        let mut msg2 = vec![];
        for (i, (session, router)) in sessions.iter_mut().zip(routers.iter_mut()).enumerate() {
            let batch = router.select(&msg1, ids[i], &ids).unwrap();
            msg2.extend(session.handle(batch).unwrap());
        }
        for r in &mut routers {
            r.next_round();
        }
        check_serde(&msg2);

        let mut msg3 = vec![];
        for (i, (session, router)) in sessions.iter_mut().zip(routers.iter_mut()).enumerate() {
            let batch = router.select(&msg2, ids[i], &ids).unwrap();
            msg3.extend(session.handle(batch).unwrap());
        }
        for r in &mut routers {
            r.next_round();
        }
        check_serde(&msg3);

        let mut msg4 = vec![];
        for (i, (session, router)) in sessions.iter_mut().zip(routers.iter_mut()).enumerate() {
            let batch = router.select(&msg3, ids[i], &ids).unwrap();
            session.handle(batch).unwrap();
        }

        let mut last = vec![];
        for session in sessions.iter_mut() {
            last.push(session.last_message(&digest).unwrap());
        }
        check_serde(&last);

        sessions
            .into_iter()
            .enumerate()
            .map(|(i, session)| {
                let batch: Vec<Frame> = last
                    .iter()
                    .filter(|f| f.from != ids[i])
                    .cloned()
                    .collect();
                session.combine(batch).unwrap()
            })
            .collect()
    }

    #[test]
    fn sign_2_of_2() {
        let shares = run_keygen(ThresholdConfig::new(2, 2).unwrap());
        let sigs = run_sign(shares, [7u8; 32]);
        assert_eq!(sigs[0], sigs[1]);
    }

    #[test]
    fn sign_2_of_3_subset() {
        let mut shares = run_keygen(ThresholdConfig::new(3, 2).unwrap());
        shares.truncate(2);
        let sigs = run_sign(shares, [9u8; 32]);
        assert_eq!(sigs[0], sigs[1]);
    }

    #[test]
    fn non_identity_path_rejected() {
        let mut shares = run_keygen(ThresholdConfig::new(2, 2).unwrap());
        let err = SignSession::new(shares.remove(0), "m/0").unwrap_err();
        assert!(matches!(err, SignError::DerivationUnsupported));
    }

    #[test]
    fn digest_of_wrong_length_is_rejected() {
        let mut shares = run_keygen(ThresholdConfig::new(2, 2).unwrap());
        let mut session = SignSession::new(shares.remove(0), "m").unwrap();
        let err = session.last_message(&[0u8; 31]).unwrap_err();
        assert!(matches!(err, SignError::DigestLengthInvalid));
    }

    #[test]
    fn last_message_before_presignature_is_not_ready() {
        let mut shares = run_keygen(ThresholdConfig::new(2, 2).unwrap());
        let mut session = SignSession::new(shares.remove(0), "m").unwrap();
        let err = session.last_message(&[0u8; 32]).unwrap_err();
        assert!(matches!(err, SignError::SessionNotReady));
    }

    #[test]
    fn first_message_is_one_shot() {
        let mut shares = run_keygen(ThresholdConfig::new(2, 2).unwrap());
        let mut session = SignSession::new(shares.remove(0), "m").unwrap();
        session.first_message().unwrap();
        let err = session.first_message().unwrap_err();
        assert!(matches!(err, SignError::SessionSpent));
    }
}
