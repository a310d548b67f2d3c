// Copyright (c) Silence Laboratories Pte. Ltd. All Rights Reserved.
// This software is licensed under the Silence Laboratories License Agreement.

//! End-to-end scenarios across keygen, signing, and recovery, exercising
//! the public API the way an embedder would: build sessions, shuttle
//! `Frame`s through a `Router`, and finalize.

use dkls23_core::{
    field::{decompress_point, point_to_bytes, FieldBytes},
    keygen::{Commitment, KeygenSession, RoundCommitments},
    keyshare::Keyshare,
    recovery::recover_id,
    sign::SignSession,
    wire::{Frame, Router},
    FieldError, KeygenError, PartyId, SignError, ThresholdConfig,
};
use k256::{
    ecdsa::{signature::hazmat::PrehashVerifier, Signature, VerifyingKey},
    elliptic_curve::sec1::ToEncodedPoint,
};
use sha2::{Digest, Sha256};

fn run_keygen(config: ThresholdConfig) -> Vec<Keyshare> {
    let ids: Vec<PartyId> = config.ids().to_vec();
    let mut sessions: Vec<KeygenSession> = ids
        .iter()
        .map(|&id| KeygenSession::new(config.clone(), id))
        .collect();
    let mut routers: Vec<Router> = ids.iter().map(|_| Router::new()).collect();

    let msg1: Vec<Frame> = sessions.iter_mut().map(|s| s.first_message()).collect();

    let mut msg2 = vec![];
    for (i, (session, router)) in sessions.iter_mut().zip(routers.iter_mut()).enumerate() {
        let batch = router.select(&msg1, ids[i], &ids).unwrap();
        msg2.extend(session.handle(batch, None).unwrap());
    }
    for r in &mut routers {
        r.next_round();
    }

    let mut msg3 = vec![];
    for (i, (session, router)) in sessions.iter_mut().zip(routers.iter_mut()).enumerate() {
        let batch = router.select(&msg2, ids[i], &ids).unwrap();
        msg3.extend(session.handle(batch, None).unwrap());
    }
    for r in &mut routers {
        r.next_round();
    }

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

/// Run the full sign protocol for a subset of keyshares, returning each
/// party's `(r, s)` and the shared public key.
fn run_sign(shares: Vec<Keyshare>, digest: [u8; 32]) -> (Vec<([u8; 32], [u8; 32])>, k256::AffinePoint) {
    let public_key = shares[0].public_key;
    let ids: Vec<PartyId> = shares.iter().map(|s| s.party_id).collect();
    let mut sessions: Vec<SignSession> = shares
        .into_iter()
        .map(|s| SignSession::new(s, "m").unwrap())
        .collect();
    let mut routers: Vec<Router> = ids.iter().map(|_| Router::new()).collect();

    let msg1: Vec<Frame> = sessions.iter_mut().map(|s| s.first_message().unwrap()).collect();

    let mut msg2 = vec![];
    for (i, (session, router)) in sessions.iter_mut().zip(routers.iter_mut()).enumerate() {
        let batch = router.select(&msg1, ids[i], &ids).unwrap();
        msg2.extend(session.handle(batch).unwrap());
    }
    for r in &mut routers {
        r.next_round();
    }

    let mut msg3 = vec![];
    for (i, (session, router)) in sessions.iter_mut().zip(routers.iter_mut()).enumerate() {
        let batch = router.select(&msg2, ids[i], &ids).unwrap();
        msg3.extend(session.handle(batch).unwrap());
    }
    for r in &mut routers {
        r.next_round();
    }

    let mut msg4 = vec![];
    for (i, (session, router)) in sessions.iter_mut().zip(routers.iter_mut()).enumerate() {
        let batch = router.select(&msg3, ids[i], &ids).unwrap();
        session.handle(batch).unwrap();
    }

    let mut last = vec![];
    for session in sessions.iter_mut() {
        last.push(session.last_message(&digest).unwrap());
    }

    let sigs = sessions
        .into_iter()
        .enumerate()
        .map(|(i, session)| {
            let batch: Vec<Frame> = last.iter().filter(|f| f.from != ids[i]).cloned().collect();
            session.combine(batch).unwrap()
        })
        .collect();

    (sigs, public_key)
}

fn verify(public_key: &k256::AffinePoint, digest: &[u8; 32], r: &[u8; 32], s: &[u8; 32]) {
    let sig = Signature::from_scalars(*r, *s).unwrap();
    VerifyingKey::from_affine(*public_key)
        .unwrap()
        .verify_prehash(digest, &sig)
        .unwrap();
}

#[test]
fn scenario_1_keygen_then_sign_2_of_3() {
    let config = ThresholdConfig::new(3, 2).unwrap();
    let shares = run_keygen(config);
    assert_eq!(shares.len(), 3);
    assert_eq!(shares[0].public_key, shares[1].public_key);
    assert_eq!(shares[1].public_key, shares[2].public_key);

    let q = shares[0].public_key;
    let subset: Vec<Keyshare> = shares.into_iter().take(2).collect();
    let digest = [0u8; 32];
    let (sigs, public_key) = run_sign(subset, digest);

    assert_eq!(sigs[0], sigs[1]);
    verify(&public_key, &digest, &sigs[0].0, &sigs[0].1);
    assert_eq!(public_key, q);
}

#[test]
fn scenario_2_signer_subset_equivalence() {
    let config = ThresholdConfig::new(3, 2).unwrap();
    let shares = run_keygen(config);
    let q = shares[0].public_key;
    let digest = [7u8; 32];

    let subset_a: Vec<Keyshare> = vec![shares[0].clone(), shares[1].clone()];
    let subset_b: Vec<Keyshare> = vec![shares[1].clone(), shares[2].clone()];

    let (sigs_a, pk_a) = run_sign(subset_a, digest);
    let (sigs_b, pk_b) = run_sign(subset_b, digest);

    assert_eq!(pk_a, q);
    assert_eq!(pk_b, q);
    verify(&pk_a, &digest, &sigs_a[0].0, &sigs_a[0].1);
    verify(&pk_b, &digest, &sigs_b[0].0, &sigs_b[0].1);
}

#[test]
fn scenario_3_one_shot_enforcement() {
    let config = ThresholdConfig::new(2, 2).unwrap();
    let shares = run_keygen(config);

    let ids: Vec<PartyId> = shares.iter().map(|s| s.party_id).collect();
    let mut sessions: Vec<SignSession> = shares
        .into_iter()
        .map(|s| SignSession::new(s, "m").unwrap())
        .collect();
    let mut routers: Vec<Router> = ids.iter().map(|_| Router::new()).collect();

    let msg1: Vec<Frame> = sessions.iter_mut().map(|s| s.first_message().unwrap()).collect();
    let mut msg2 = vec![];
    for (i, (session, router)) in sessions.iter_mut().zip(routers.iter_mut()).enumerate() {
        let batch = router.select(&msg1, ids[i], &ids).unwrap();
        msg2.extend(session.handle(batch).unwrap());
    }
    for r in &mut routers {
        r.next_round();
    }
    let mut msg3 = vec![];
    for (i, (session, router)) in sessions.iter_mut().zip(routers.iter_mut()).enumerate() {
        let batch = router.select(&msg2, ids[i], &ids).unwrap();
        msg3.extend(session.handle(batch).unwrap());
    }
    for r in &mut routers {
        r.next_round();
    }
    let mut msg4 = vec![];
    for (i, (session, router)) in sessions.iter_mut().zip(routers.iter_mut()).enumerate() {
        let batch = router.select(&msg3, ids[i], &ids).unwrap();
        session.handle(batch).unwrap();
    }

    let digest_a = [1u8; 32];
    let digest_b = [2u8; 32];

    let mut session0 = sessions.remove(0);
    let _ = session0.last_message(&digest_a).unwrap();

    let err = session0.last_message(&digest_b).unwrap_err();
    assert!(matches!(err, SignError::SessionSpent));
}

#[test]
fn scenario_4_recovery_id_parity() {
    let config = ThresholdConfig::new(2, 2).unwrap();
    let shares = run_keygen(config);
    let q = shares[0].public_key;

    let digest: [u8; 32] = Sha256::digest("hello").into();

    let mut saw_even = false;
    let mut saw_odd = false;

    for _ in 0..32 {
        let (sigs, public_key) = run_sign(shares.clone(), digest);
        assert_eq!(public_key, q);
        let (r, s) = sigs[0];

        let v = recover_id(&r, &s, &digest, &public_key).unwrap();
        assert!(v == 0 || v == 1);
        if v == 0 {
            saw_even = true;
        } else {
            saw_odd = true;
        }
    }

    assert!(saw_even && saw_odd, "expected both recovery ids across 32 fresh signs");
}

#[test]
fn scenario_5_decompression_edge_cases() {
    // x = 0: alpha = 7, not a quadratic residue mod p.
    let zero = FieldBytes::default();
    assert_eq!(decompress_point(&zero, false), Err(FieldError::PointInvalid));

    let g = k256::ProjectivePoint::GENERATOR.to_affine();
    let compressed = point_to_bytes(&g);
    assert!(compressed[0] == 0x02 || compressed[0] == 0x03);

    let x_bytes = FieldBytes::clone_from_slice(&compressed[1..33]);
    let recovered = decompress_point(&x_bytes, compressed[0] == 0x03).unwrap();
    assert_eq!(recovered, g);

    let encoded = recovered.to_encoded_point(false);
    let y = encoded.y().unwrap();
    let y_is_odd = y[31] & 1 == 1;
    assert_eq!(y_is_odd, compressed[0] == 0x03);
}

#[test]
fn scenario_6_rotation_preserves_q_and_rejects_mixed_shares() {
    let config = ThresholdConfig::new(3, 2).unwrap();
    let old_shares = run_keygen(config.clone());
    let old_q = old_shares[0].public_key;

    let ids: Vec<PartyId> = config.ids().to_vec();
    let mut sessions: Vec<KeygenSession> = old_shares
        .iter()
        .map(|s| KeygenSession::new_rotation(s).unwrap())
        .collect();
    let mut routers: Vec<Router> = ids.iter().map(|_| Router::new()).collect();

    let msg1: Vec<Frame> = sessions.iter_mut().map(|s| s.first_message()).collect();
    let mut msg2 = vec![];
    for (i, (session, router)) in sessions.iter_mut().zip(routers.iter_mut()).enumerate() {
        let batch = router.select(&msg1, ids[i], &ids).unwrap();
        msg2.extend(session.handle(batch, None).unwrap());
    }
    for r in &mut routers {
        r.next_round();
    }
    let mut msg3 = vec![];
    for (i, (session, router)) in sessions.iter_mut().zip(routers.iter_mut()).enumerate() {
        let batch = router.select(&msg2, ids[i], &ids).unwrap();
        msg3.extend(session.handle(batch, None).unwrap());
    }
    for r in &mut routers {
        r.next_round();
    }
    let commitments: Vec<Commitment> = sessions.iter().map(|s| s.chain_code_commitment()).collect();
    let mut msg4 = vec![];
    for (i, (session, router)) in sessions.iter_mut().zip(routers.iter_mut()).enumerate() {
        let batch = router.select(&msg3, ids[i], &ids).unwrap();
        let mut rc = RoundCommitments::new();
        for (&id, &c) in ids.iter().zip(commitments.iter()) {
            rc.insert(id, c);
        }
        msg4.extend(session.handle(batch, Some(rc)).unwrap());
    }
    for r in &mut routers {
        r.next_round();
    }

    let new_raw_shares: Vec<Keyshare> = sessions
        .into_iter()
        .enumerate()
        .map(|(i, mut session)| {
            let batch = routers[i].select(&msg4, ids[i], &ids).unwrap();
            session.handle(batch, None).unwrap();
            session.finalize().unwrap()
        })
        .collect();

    let new_shares: Vec<Keyshare> = new_raw_shares
        .into_iter()
        .zip(old_shares.iter())
        .map(|(new, old)| new.finish_rotation(old).unwrap())
        .collect();

    assert_eq!(new_shares[0].public_key, old_q);

    let mut old_bytes = Vec::new();
    ciborium::into_writer(&old_shares[0], &mut old_bytes).unwrap();
    let mut new_bytes = Vec::new();
    ciborium::into_writer(&new_shares[0], &mut new_bytes).unwrap();
    assert_ne!(old_bytes, new_bytes, "rotation must change the keyshare's serialised bytes");

    let digest = [9u8; 32];
    let subset: Vec<Keyshare> = new_shares.into_iter().skip(1).collect();
    let (sigs, public_key) = run_sign(subset, digest);
    assert_eq!(public_key, old_q);
    verify(&public_key, &digest, &sigs[0].0, &sigs[0].1);
}

#[test]
fn rotation_rejects_mismatched_public_key() {
    let config_a = ThresholdConfig::new(2, 2).unwrap();
    let config_b = ThresholdConfig::new(2, 2).unwrap();
    let shares_a = run_keygen(config_a);
    let shares_b = run_keygen(config_b);

    let err = shares_b[0].clone().finish_rotation(&shares_a[0]).unwrap_err();
    assert!(matches!(err, KeygenError::RotationMismatch));
}
