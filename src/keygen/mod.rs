// Copyright (c) Silence Laboratories Pte. Ltd. All Rights Reserved.
// This software is licensed under the Silence Laboratories License Agreement.

//! Distributed key generation (Component B).
//!
//! The round structure, commitment scheme, Feldman verification and
//! OT/PPRF-backed secret derivation are carried from the teacher's
//! `dkg.rs`. What changes is indexing: the teacher keys several structures
//! (`ranks: Vec<u8>`, and base-OT peer seeds via `get_idx_from_id`) by a
//! party's *position* in a sorted id list rather than its id, which
//! corrupts keygen the moment ids stop being a dense `0..n` range. Every
//! per-peer structure here is a [`Pairs`] keyed by the real
//! [`PartyId`][crate::ids::PartyId] instead, and ranks are dropped
//! entirely — this crate never exposes weighted/hierarchical shares, so
//! every party's rank is always `0`, exactly the case where the teacher's
//! own Birkhoff-coefficient math degrades to plain Lagrange interpolation.

mod messages;

pub use messages::{KeygenMsg1, KeygenMsg2, KeygenMsg3, KeygenMsg4};

use std::collections::HashSet;

use k256::{
    elliptic_curve::{group::prime::PrimeCurveAffine, subtle::ConstantTimeEq, Group},
    FieldBytes, NonZeroScalar, ProjectivePoint, Scalar, Secp256k1,
};
use merlin::Transcript;
use rand::prelude::*;
use sha2::{Digest, Sha256};
use sl_mpc_mate::math::{feldman_verify, polynomial_coeff_multipliers, GroupPolynomial, Polynomial};
use sl_oblivious::{
    endemic_ot::{EndemicOTMsg2, EndemicOTReceiver, EndemicOTSender},
    soft_spoken::{build_pprf, eval_pprf, PPRFOutput, ReceiverOTSeed, SenderOTSeed},
    utils::TranscriptProtocol,
    zkproofs::DLogProof,
};

use crate::{
    constants::*,
    error::KeygenError,
    ids::{PartyId, ThresholdConfig},
    keyshare::Keyshare,
    pairs::Pairs,
    utils::*,
    wire::Frame,
};

/// A keygen chain-code commitment: `SHA-256` output from
/// [`KeygenSession::chain_code_commitment`].
pub type Commitment = [u8; 32];

/// The round-2→round-3 chain-code commitments collected out of band by the
/// embedder (everyone's [`KeygenSession::chain_code_commitment`] output),
/// keyed by the committing party's real id.
///
/// Replaces the teacher's untyped `&[[u8; 32]]` parameter to `handle_msg3`,
/// which it indexed with `commitment_2_list.get(msg.from_id as usize)` —
/// another spot where a raw id was used as a position, silently wrong for
/// non-contiguous ids.
#[derive(Debug, Default)]
pub struct RoundCommitments(Pairs<Commitment, PartyId>);

impl RoundCommitments {
    pub fn new() -> Self {
        Self(Pairs::new())
    }

    pub fn insert(&mut self, party_id: PartyId, commitment: Commitment) {
        self.0.push(party_id, commitment);
    }
}

/// Which round a [`KeygenSession`] is waiting to process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Round {
    One,
    Two,
    Three,
    Four,
    Done,
}

struct Engine {
    party_id: PartyId,
    config: ThresholdConfig,
    rotation: bool,

    final_session_id: [u8; 32],
    polynomial: Polynomial<Secp256k1>,
    big_f_vec: GroupPolynomial<Secp256k1>,
    chain_code_sids: Pairs<[u8; 32], PartyId>,
    root_chain_code: [u8; 32],
    r_i_2: [u8; 32],
    commitment_list: Pairs<[u8; 32], PartyId>,
    sid_i_list: Pairs<[u8; 32], PartyId>,
    x_i_list: Pairs<NonZeroScalar, PartyId>,
    r_i_list: Pairs<[u8; 32], PartyId>,
    d_i_list: Pairs<Scalar, PartyId>,
    big_f_i_vecs: Pairs<GroupPolynomial<Secp256k1>, PartyId>,
    dlog_proofs_i_list: Pairs<Vec<DLogProof>, PartyId>,
    s_i: Scalar,
    seed_ot_receivers: Pairs<ZS<ReceiverOTSeed>, PartyId>,
    seed_ot_senders: Pairs<ZS<SenderOTSeed>, PartyId>,
    rec_seed_list: Pairs<[u8; 32], PartyId>,
    seed_i_j_list: Pairs<[u8; 32], PartyId>,
    base_ot_receivers: Pairs<EndemicOTReceiver, PartyId>,
}

impl Engine {
    fn new<R: RngCore + CryptoRng>(
        config: ThresholdConfig,
        party_id: PartyId,
        rng: &mut R,
        x_i: Option<&NonZeroScalar>,
    ) -> Self {
        let rotation = x_i.is_some();
        let t = config.t();

        let r_i = rng.gen();
        let session_id = rng.gen();

        let mut polynomial = Polynomial::random(rng, t as usize - 1);
        if rotation {
            polynomial.reset_contant();
        }

        let x_i = match x_i {
            Some(x_i) => *x_i,
            None => NonZeroScalar::random(rng),
        };

        let big_f_i_vec = polynomial.commit();
        let commitment = hash_commitment(&session_id, party_id as usize, 0, &x_i, &big_f_i_vec, &r_i);
        let d_i = polynomial.derivative_at(0, &x_i);

        Self {
            party_id,
            rotation,
            r_i_2: rng.gen(),
            sid_i_list: Pairs::new_with_item(party_id, session_id),
            x_i_list: Pairs::new_with_item(party_id, x_i),
            r_i_list: Pairs::new_with_item(party_id, r_i),
            d_i_list: Pairs::new_with_item(party_id, d_i),
            commitment_list: Pairs::new_with_item(party_id, commitment),
            chain_code_sids: Pairs::new_with_item(party_id, rng.gen()),
            root_chain_code: [0; 32],
            big_f_vec: GroupPolynomial::identity(t as usize),
            big_f_i_vecs: Pairs::new_with_item(party_id, big_f_i_vec),
            final_session_id: [0; 32],
            base_ot_receivers: Pairs::new(),
            dlog_proofs_i_list: Pairs::new(),
            s_i: Scalar::ZERO,
            rec_seed_list: Pairs::new(),
            seed_ot_receivers: Pairs::new(),
            seed_i_j_list: Pairs::new(),
            seed_ot_senders: Pairs::new(),
            polynomial,
            config,
        }
    }

    fn generate_msg1(&self) -> KeygenMsg1 {
        KeygenMsg1 {
            from_id: self.party_id,
            session_id: *self.sid_i_list.find_pair(self.party_id),
            commitment: *self.commitment_list.find_pair(self.party_id),
            x_i: *self.x_i_list.find_pair(self.party_id),
        }
    }

    fn chain_code_commitment(&self) -> Commitment {
        let chain_code_sid = self.chain_code_sids.find_pair(self.party_id);
        hash_commitment_2(&self.final_session_id, chain_code_sid, &self.r_i_2)
    }

    #[tracing::instrument(level = "debug", skip_all, fields(party_id = self.party_id))]
    fn handle_msg1<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
        msgs: Vec<KeygenMsg1>,
    ) -> Result<Vec<KeygenMsg2>, KeygenError> {
        if msgs.len() + 1 != self.config.n() as usize {
            return Err(KeygenError::MissingMessage);
        }

        for msg in msgs {
            self.config.require(msg.from_id)?;
            self.sid_i_list.push(msg.from_id, msg.session_id);
            self.x_i_list.push(msg.from_id, msg.x_i);
            self.commitment_list.push(msg.from_id, msg.commitment);
        }

        if HashSet::<FieldBytes>::from_iter(self.x_i_list.iter().map(|(_, x)| x.to_bytes())).len()
            != self.x_i_list.len()
        {
            return Err(KeygenError::NotUniqueXiValues);
        }

        self.final_session_id = self
            .sid_i_list
            .iter()
            .fold(Sha256::new(), |hash, (_, sid)| hash.chain_update(sid))
            .finalize()
            .into();

        let dlog_proofs = {
            let mut dlog_transcript = Transcript::new_dlog_proof(
                &self.final_session_id,
                self.party_id as usize,
                &DLOG_PROOF1_LABEL,
                &DKG_LABEL,
            );

            self.polynomial
                .iter()
                .map(|f_i| DLogProof::prove(f_i, &ProjectivePoint::GENERATOR, &mut dlog_transcript, rng))
                .collect::<Vec<_>>()
        };

        let mut output = vec![];

        self.base_ot_receivers = self
            .config
            .other_ids(self.party_id)
            .map(|p| {
                let base_ot_session_id =
                    get_base_ot_session_id(self.party_id as usize, p as usize, &self.final_session_id);

                let mut msg1 = ZS::default();
                let receiver = EndemicOTReceiver::new(&base_ot_session_id, &mut msg1, rng);

                output.push(KeygenMsg2 {
                    from_id: self.party_id,
                    to_id: p,
                    ot: msg1,
                    r_i: *self.r_i_list.find_pair(self.party_id),
                    dlog_proofs: dlog_proofs.clone(),
                    big_f_i_vec: self.big_f_i_vecs.find_pair(self.party_id).clone(),
                });

                (p, receiver)
            })
            .fold(Pairs::new(), |mut pairs, (p, r)| {
                pairs.push(p, r);
                pairs
            });

        Ok(output)
    }

    #[tracing::instrument(level = "debug", skip_all, fields(party_id = self.party_id))]
    fn handle_msg2<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
        msgs: Vec<KeygenMsg2>,
    ) -> Result<Vec<KeygenMsg3>, KeygenError> {
        if msgs.len() + 1 != self.config.n() as usize {
            return Err(KeygenError::MissingMessage);
        }

        for msg in &msgs {
            self.r_i_list.push(msg.from_id, msg.r_i);
            self.big_f_i_vecs.push(msg.from_id, msg.big_f_i_vec.clone());
            self.dlog_proofs_i_list.push(msg.from_id, msg.dlog_proofs.clone());
        }

        for party_id in self.config.ids().iter().copied() {
            if party_id == self.party_id {
                continue;
            }

            let x_i = self.x_i_list.find_pair(party_id);
            let r_i = self.r_i_list.find_pair(party_id);
            let sid = self.sid_i_list.find_pair(party_id);
            let commitment = self.commitment_list.find_pair(party_id);
            let big_f_i_vector = self.big_f_i_vecs.find_pair(party_id);

            let commit_hash = hash_commitment(sid, party_id as usize, 0, x_i, big_f_i_vector, r_i);

            if commit_hash.ct_ne(commitment).into() {
                return Err(KeygenError::InvalidCommitmentHash);
            }

            {
                let mut points = big_f_i_vector.points();
                if self.rotation {
                    if points.next() != Some(&ProjectivePoint::IDENTITY) {
                        return Err(KeygenError::InvalidPolynomialPoint);
                    }
                }
                if points.any(|p| p.is_identity().into()) {
                    return Err(KeygenError::InvalidPolynomialPoint);
                }
            }

            verify_dlog_proofs(
                &self.final_session_id,
                party_id as usize,
                self.dlog_proofs_i_list.find_pair(party_id),
                big_f_i_vector.points(),
            )?;
        }

        for (_, v) in self.big_f_i_vecs.iter() {
            self.big_f_vec.add_mut(v);
        }

        let public_key = self.big_f_vec.get_constant();

        if self.rotation && public_key != ProjectivePoint::IDENTITY {
            return Err(KeygenError::InvalidPolynomialPoint);
        }

        msgs.into_iter()
            .map(|msg| {
                if msg.to_id != self.party_id {
                    return Err(KeygenError::InvalidMessage);
                }

                let sid = get_base_ot_session_id(msg.from_id as usize, self.party_id as usize, &self.final_session_id);
                let mut base_ot_msg2 = ZS::<EndemicOTMsg2>::default();

                let sender_output = EndemicOTSender::process(&sid, &msg.ot, &mut base_ot_msg2, rng);

                let mut all_but_one_sender_seed = ZS::<SenderOTSeed>::default();
                let mut pprf_output = ZS::<PPRFOutput>::default();

                build_pprf(
                    &self.final_session_id,
                    &sender_output,
                    &mut all_but_one_sender_seed,
                    &mut pprf_output,
                );

                self.seed_ot_senders.push(msg.from_id, all_but_one_sender_seed);

                let seed_i_j = if msg.from_id > self.party_id {
                    let seed_i_j = rng.gen();
                    self.seed_i_j_list.push(msg.from_id, seed_i_j);
                    Some(seed_i_j)
                } else {
                    None
                };

                let x_i = self.x_i_list.find_pair(msg.from_id);
                let d_i = self.polynomial.derivative_at(0, x_i);

                Ok(KeygenMsg3 {
                    from_id: self.party_id,
                    to_id: msg.from_id,
                    base_ot_msg2,
                    pprf_output,
                    seed_i_j,
                    d_i,
                    big_f_vec: self.big_f_vec.clone(),
                    chain_code_sid: *self.chain_code_sids.find_pair(self.party_id),
                    r_i_2: self.r_i_2,
                })
            })
            .collect()
    }

    #[tracing::instrument(level = "debug", skip_all, fields(party_id = self.party_id))]
    fn handle_msg3<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
        msgs: Vec<KeygenMsg3>,
        commitments: &RoundCommitments,
    ) -> Result<KeygenMsg4, KeygenError> {
        if msgs.len() + 1 != self.config.n() as usize {
            return Err(KeygenError::MissingMessage);
        }

        for msg3 in msgs {
            if msg3.big_f_vec != self.big_f_vec {
                return Err(KeygenError::BigFVecMismatch);
            }

            self.d_i_list.push(msg3.from_id, msg3.d_i);

            let receiver = self.base_ot_receivers.pop_pair(msg3.from_id);
            let receiver_output = receiver.process(&msg3.base_ot_msg2);

            let mut all_but_one_receiver_seed = ZS::<ReceiverOTSeed>::default();

            eval_pprf(
                &self.final_session_id,
                &receiver_output,
                &msg3.pprf_output,
                &mut all_but_one_receiver_seed,
            )
            .map_err(KeygenError::PPRFError)?;

            self.seed_ot_receivers.push(msg3.from_id, all_but_one_receiver_seed);
            if let Some(seed_j_i) = msg3.seed_i_j {
                self.rec_seed_list.push(msg3.from_id, seed_j_i);
            }

            let commitment_2 = commitments
                .0
                .find_pair_or_err(msg3.from_id, KeygenError::InvalidMessage)?;

            let commit_hash = hash_commitment_2(&self.final_session_id, &msg3.chain_code_sid, &msg3.r_i_2);

            if commit_hash.ct_ne(commitment_2).into() {
                return Err(KeygenError::InvalidCommitmentHash);
            }

            self.chain_code_sids.push(msg3.from_id, msg3.chain_code_sid);
        }

        self.root_chain_code = self
            .chain_code_sids
            .iter()
            .fold(Sha256::new(), |hash, (_, sid)| hash.chain_update(sid))
            .finalize()
            .into();

        for ((_, big_f_i_vec), (_, f_i_val)) in self.big_f_i_vecs.iter().zip(self.d_i_list.iter()) {
            let coeffs = big_f_i_vec.derivative_coeffs(0);
            let valid = feldman_verify(
                coeffs,
                self.x_i_list.find_pair(self.party_id),
                f_i_val,
                &ProjectivePoint::GENERATOR,
            );

            if !valid {
                return Err(KeygenError::FailedFelmanVerify);
            }
        }

        self.s_i = self.d_i_list.iter().map(|(_, s)| s).sum();
        let big_s_i = ProjectivePoint::GENERATOR * self.s_i;

        let proof = {
            let mut transcript = Transcript::new_dlog_proof(
                &self.final_session_id,
                self.party_id as usize,
                &DLOG_PROOF2_LABEL,
                &DKG_LABEL,
            );

            DLogProof::prove(&self.s_i, &ProjectivePoint::GENERATOR, &mut transcript, rng)
        };

        Ok(KeygenMsg4 {
            from_id: self.party_id,
            proof,
            big_s_i: big_s_i.to_affine(),
            public_key: self.big_f_vec.get_constant().to_affine(),
        })
    }

    #[tracing::instrument(level = "debug", skip_all, fields(party_id = self.party_id))]
    fn handle_msg4(&mut self, msgs: Vec<KeygenMsg4>) -> Result<Keyshare, KeygenError> {
        if msgs.len() + 1 != self.config.n() as usize {
            return Err(KeygenError::MissingMessage);
        }

        let public_key = self.big_f_vec.get_constant().to_affine();
        let mut big_s_list = Pairs::new();
        let mut proof_list = Pairs::new();

        for msg in msgs {
            if msg.public_key != public_key {
                return Err(KeygenError::PublicKeyMismatch);
            }

            big_s_list.push(msg.from_id, msg.big_s_i.to_curve());
            proof_list.push(msg.from_id, msg.proof);
        }

        for ((party_id, big_s_i), (_, dlog_proof)) in big_s_list.iter().zip(proof_list.iter()) {
            let mut transcript =
                Transcript::new_dlog_proof(&self.final_session_id, *party_id as usize, &DLOG_PROOF2_LABEL, &DKG_LABEL);
            if dlog_proof
                .verify(big_s_i, &ProjectivePoint::GENERATOR, &mut transcript)
                .unwrap_u8()
                == 0
            {
                return Err(KeygenError::InvalidDLogProof);
            }
        }

        for (party_id, x_i) in self.x_i_list.iter() {
            if *party_id == self.party_id {
                continue;
            }

            let coeff_multipliers = polynomial_coeff_multipliers(x_i, 0, self.config.n() as usize);

            let expected_point: ProjectivePoint = self
                .big_f_vec
                .points()
                .zip(coeff_multipliers)
                .map(|(point, coeff)| point * &coeff)
                .sum();

            if expected_point != *big_s_list.find_pair(*party_id) {
                return Err(KeygenError::BigSMismatch);
            }
        }

        big_s_list.push(self.party_id, ProjectivePoint::GENERATOR * self.s_i);

        let rank_list = vec![0u8; self.config.n() as usize];
        check_secret_recovery(
            &self.x_i_list.remove_ids(),
            &rank_list,
            &big_s_list.remove_ids(),
            &public_key.to_curve(),
        )?;

        let big_s_list_affine = big_s_list
            .iter()
            .fold(Pairs::new(), |mut acc, (id, p)| {
                acc.push(*id, p.to_affine());
                acc
            });

        Ok(Keyshare {
            config: self.config.clone(),
            party_id: self.party_id,
            public_key,
            root_chain_code: self.root_chain_code,
            x_i_list: std::mem::replace(&mut self.x_i_list, Pairs::new()),
            big_s_list: big_s_list_affine,
            s_i: self.s_i,
            sent_seed_list: std::mem::replace(&mut self.seed_i_j_list, Pairs::new()),
            seed_ot_receivers: std::mem::replace(&mut self.seed_ot_receivers, Pairs::new()),
            seed_ot_senders: std::mem::replace(&mut self.seed_ot_senders, Pairs::new()),
            rec_seed_list: std::mem::replace(&mut self.rec_seed_list, Pairs::new()),
        })
    }
}

/// A keygen (or key-rotation) session in progress for one party.
///
/// Owns the full per-round state machine; [`KeygenSession::handle`] is the
/// single entry point for every round after the first, so callers never
/// need to remember which internal method corresponds to which wire round.
pub struct KeygenSession {
    engine: Engine,
    round: Round,
    keyshare: Option<Keyshare>,
}

impl KeygenSession {
    /// Start a fresh key generation for `party_id` within `config`.
    pub fn new(config: ThresholdConfig, party_id: PartyId) -> Self {
        let mut rng = rand::thread_rng();
        Self {
            engine: Engine::new(config, party_id, &mut rng, None),
            round: Round::One,
            keyshare: None,
        }
    }

    /// Start a key-rotation session: a fresh polynomial with the same
    /// public key and the same `x_i` this party held in `existing`, so the
    /// resulting share can later be finalized against it with
    /// [`Keyshare::finish_rotation`].
    pub fn new_rotation(existing: &Keyshare) -> Result<Self, KeygenError> {
        let mut rng = rand::thread_rng();
        let x_i = *existing.x_i_list.find_pair(existing.party_id);
        Ok(Self {
            engine: Engine::new(existing.config.clone(), existing.party_id, &mut rng, Some(&x_i)),
            round: Round::One,
            keyshare: None,
        })
    }

    /// Build this party's round-1 broadcast frame. Must be called once,
    /// before the first [`KeygenSession::handle`].
    pub fn first_message(&mut self) -> Frame {
        Frame::new(&self.engine.generate_msg1())
    }

    /// This party's commitment to its chain-code share, to be collected by
    /// the embedder from every party (out of band — there is no network
    /// layer here) and handed back in as [`RoundCommitments`] for round 3.
    pub fn chain_code_commitment(&self) -> Commitment {
        self.engine.chain_code_commitment()
    }

    /// Process one round's incoming frames and produce the next round's
    /// outgoing frames. `commitments` is required (and used) only for the
    /// round-3 step; pass `None` otherwise.
    #[tracing::instrument(level = "info", skip_all, fields(party_id = self.engine.party_id, round = ?self.round))]
    pub fn handle(
        &mut self,
        frames: Vec<Frame>,
        commitments: Option<RoundCommitments>,
    ) -> Result<Vec<Frame>, KeygenError> {
        let mut rng = rand::thread_rng();

        match self.round {
            Round::One => {
                let msgs = decode_all::<KeygenMsg1>(frames)?;
                let out = self.engine.handle_msg1(&mut rng, msgs)?;
                self.round = Round::Two;
                Ok(out.iter().map(Frame::new).collect())
            }
            Round::Two => {
                let msgs = decode_all::<KeygenMsg2>(frames)?;
                let out = self.engine.handle_msg2(&mut rng, msgs)?;
                self.round = Round::Three;
                Ok(out.iter().map(Frame::new).collect())
            }
            Round::Three => {
                let msgs = decode_all::<KeygenMsg3>(frames)?;
                let commitments = commitments.unwrap_or_default();
                let out = self.engine.handle_msg3(&mut rng, msgs, &commitments)?;
                self.round = Round::Four;
                Ok(vec![Frame::new(&out)])
            }
            Round::Four => {
                let msgs = decode_all::<KeygenMsg4>(frames)?;
                self.keyshare = Some(self.engine.handle_msg4(msgs)?);
                self.round = Round::Done;
                tracing::info!(party_id = self.engine.party_id, "keygen finalized");
                Ok(vec![])
            }
            Round::Done => {
                tracing::warn!(party_id = self.engine.party_id, "handle called after keygen finished");
                Err(KeygenError::MissingMessage)
            }
        }
    }

    /// Consume the session and return the resulting [`Keyshare`]. Fails
    /// with [`KeygenError::MissingMessage`] unless round 4 has already
    /// been processed via [`KeygenSession::handle`].
    pub fn finalize(self) -> Result<Keyshare, KeygenError> {
        self.keyshare.ok_or(KeygenError::MissingMessage)
    }
}

fn decode_all<T: serde::de::DeserializeOwned>(frames: Vec<Frame>) -> Result<Vec<T>, KeygenError> {
    frames
        .iter()
        .map(|f| f.decode::<T>().map_err(KeygenError::from))
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use serde::{de::DeserializeOwned, Serialize};

    use super::*;
    use crate::wire::Router;

    fn check_bincode<T: Serialize + DeserializeOwned>(v: &T) {
        let bytes = bincode::serde::encode_to_vec(v, bincode::config::standard()).unwrap();
        let _: (T, _) = bincode::serde::decode_from_slice(&bytes, bincode::config::standard()).unwrap();
    }

    fn check_json<T: Serialize + DeserializeOwned>(v: &T) {
        let bytes = serde_json::to_string(v).unwrap();
        let _: T = serde_json::from_str(&bytes).unwrap();
    }

    fn check_cbor<T: Serialize + DeserializeOwned>(v: &T) {
        let mut w = vec![];
        ciborium::into_writer(v, &mut w).unwrap();
        let _: T = ciborium::from_reader(w.as_ref() as &[u8]).unwrap();
    }

    /// Round-trips every message through `bincode`, `serde_json`, and
    /// `ciborium` — the same three codecs `wire::Frame` and downstream
    /// embedders might reasonably choose between.
    pub(crate) fn check_serde<T: Serialize + DeserializeOwned>(messages: &[T]) {
        for msg in messages {
            check_bincode(msg);
            check_json(msg);
            check_cbor(msg);
        }
    }

    pub(crate) fn run_keygen(config: ThresholdConfig) -> Vec<Keyshare> {
        let ids: Vec<PartyId> = config.ids().to_vec();
        let mut sessions: Vec<KeygenSession> = ids
            .iter()
            .map(|&id| KeygenSession::new(config.clone(), id))
            .collect();
        let mut routers: Vec<Router> = ids.iter().map(|_| Router::new()).collect();

        let msg1: Vec<Frame> = sessions.iter_mut().map(|s| s.first_message()).collect();
        check_serde(&msg1);

        let mut msg2 = vec![];
        for (i, (session, router)) in sessions.iter_mut().zip(routers.iter_mut()).enumerate() {
            let batch = router.select(&msg1, ids[i], &ids).unwrap();
            msg2.extend(session.handle(batch, None).unwrap());
        }
        for r in &mut routers {
            r.next_round();
        }
        check_serde(&msg2);

        let mut msg3 = vec![];
        for (i, (session, router)) in sessions.iter_mut().zip(routers.iter_mut()).enumerate() {
            let batch = router.select(&msg2, ids[i], &ids).unwrap();
            msg3.extend(session.handle(batch, None).unwrap());
        }
        for r in &mut routers {
            r.next_round();
        }
        check_serde(&msg3);

        let commitments: Vec<Commitment> = sessions.iter().map(|s| s.chain_code_commitment()).collect();

        let mut msg4 = vec![];
        for (i, (session, router)) in sessions.iter_mut().zip(routers.iter_mut()).enumerate() {
            let batch = router.select(&msg3, ids[i], &ids).unwrap();
            let mut round_commitments = RoundCommitments::new();
            for (&id, &c) in ids.iter().zip(commitments.iter()) {
                round_commitments.insert(id, c);
            }
            msg4.extend(session.handle(batch, Some(round_commitments)).unwrap());
        }
        for r in &mut routers {
            r.next_round();
        }
        check_serde(&msg4);

        sessions
            .into_iter()
            .enumerate()
            .map(|(i, mut session)| {
                let batch = routers[i].select(&msg4, ids[i], &ids).unwrap();
                session.handle(batch, None).unwrap();
                session.finalize().unwrap()
            })
            .collect()
    }

    #[test]
    fn keygen_2_of_2_dense_ids() {
        let config = ThresholdConfig::new(2, 2).unwrap();
        let shares = run_keygen(config);
        assert_eq!(shares.len(), 2);
        assert_eq!(shares[0].public_key, shares[1].public_key);
    }

    #[test]
    fn keygen_2_of_3_dense_ids() {
        let config = ThresholdConfig::new(3, 2).unwrap();
        let shares = run_keygen(config);
        assert_eq!(shares.len(), 3);
        for s in &shares[1..] {
            assert_eq!(s.public_key, shares[0].public_key);
        }
    }

    #[test]
    fn keygen_with_non_contiguous_ids() {
        let config = ThresholdConfig::with_ids(vec![5, 0, 2], 2).unwrap();
        let shares = run_keygen(config);
        assert_eq!(shares.len(), 3);
        for s in &shares[1..] {
            assert_eq!(s.public_key, shares[0].public_key);
        }
    }
}
