// Copyright (c) Silence Laboratories Pte. Ltd. All Rights Reserved.
// This software is licensed under the Silence Laboratories License Agreement.

use thiserror::Error;

/// Errors raised while constructing or validating a [`crate::ThresholdConfig`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// `n < 2`, `t < 2`, `t > n`, or a duplicate id in the party set.
    #[error("invalid threshold configuration")]
    ConfigInvalid,

    /// A party id appears twice in the configuration.
    #[error("duplicate party id")]
    PartyIdDuplicate,

    /// A frame or keyshare referenced a party id outside the configuration.
    #[error("unknown party id")]
    PartyIdUnknown,
}

/// Errors raised while decoding or routing a [`crate::wire::Frame`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Payload could not be decoded, or had the wrong length for its kind.
    #[error("malformed frame")]
    FrameMalformed,

    /// `frame.from` is not one of the session's configured party ids.
    #[error("frame from unknown party")]
    FrameFromUnknownParty,

    /// A frame intended for a later or earlier round was handed to this round.
    #[error("frame for wrong round")]
    FrameForWrongRound,

    /// Two frames from the same sender arrived in the same round.
    #[error("duplicate frame")]
    FrameDuplicate,
}

/// Distributed key generation errors.
#[derive(Debug, Error)]
pub enum KeygenError {
    /// Error while deserializing message or invalid message data length.
    #[error(
        "error while deserializing message or invalid message data length"
    )]
    InvalidMessage,

    /// Invalid commitment hash.
    #[error("invalid commitment hash")]
    InvalidCommitmentHash,

    /// Invalid DLog proof.
    #[error("invalid dlog proof")]
    InvalidDLogProof,

    /// Invalid polynomial point.
    #[error("invalid polynomial point")]
    InvalidPolynomialPoint,

    /// Not unique x_i values.
    #[error("not unique x_i values")]
    NotUniqueXiValues,

    /// Big F vector mismatch between parties.
    #[error("big f vec mismatch")]
    BigFVecMismatch,

    /// Feldman verification of a peer's share failed.
    #[error("failed feldman verify")]
    FailedFelmanVerify,

    /// Public key mismatch between the message and the party.
    #[error("public key mismatch between the message and the party")]
    PublicKeyMismatch,

    /// Big S value mismatch.
    #[error("big s value mismatch")]
    BigSMismatch,

    /// A PPRF evaluation failed.
    #[error("pprf error {0}")]
    PPRFError(&'static str),

    /// The caller did not supply all of the expected round messages.
    #[error("missing message")]
    MissingMessage,

    /// `Keyshare::finish_rotation` was called with a key whose public key
    /// does not match the rotated share's.
    #[error("invalid key rotation")]
    RotationMismatch,

    /// A lower-level frame error.
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// A lower-level configuration error.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Threshold-signing errors.
#[derive(Debug, Error)]
pub enum SignError {
    /// Invalid commitment.
    #[error("invalid commitment")]
    InvalidCommitment,

    /// Invalid digest.
    #[error("invalid digest")]
    InvalidDigest,

    /// Invalid final_session_id.
    #[error("invalid final_session_id")]
    InvalidFinalSessionID,

    /// A consistency check between combined partial signatures failed.
    #[error("failed check: {0}")]
    FailedCheck(&'static str),

    /// The underlying k256 ECDSA machinery rejected the combined signature.
    #[error("k256 error: {0}")]
    K256Error(#[from] k256::ecdsa::Error),

    /// The caller did not supply all of the expected round messages.
    #[error("missing message")]
    MissingMessage,

    /// A peer's MtA message failed verification; abort and ban that party.
    #[error("abort the protocol and ban the party {0}")]
    AbortProtocolAndBanParty(u8),

    /// The digest passed to `last_message` was not exactly 32 bytes.
    #[error("digest must be exactly 32 bytes")]
    DigestLengthInvalid,

    /// `last_message` was called before the pre-signature rounds closed.
    #[error("session not ready: presignature incomplete")]
    SessionNotReady,

    /// `last_message` or `combine` was called on a session that already
    /// produced one (or was resurrected from a serialized duplicate).
    #[error("session already spent")]
    SessionSpent,

    /// `SignSession::new` was called with a derivation path other than `"m"`.
    #[error("only the identity derivation path \"m\" is supported")]
    DerivationUnsupported,

    /// The underlying BIP32 child-key derivation step failed. Should not
    /// occur in practice: only the identity path `"m"` is accepted at the
    /// `SignSession` boundary, and deriving zero children cannot fail.
    #[error("key derivation failed: {0}")]
    Derivation(String),

    /// A lower-level frame error.
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// A lower-level configuration error.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Errors from secp256k1 field and point operations (Component A).
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FieldError {
    /// A candidate point failed to satisfy the curve equation, or its
    /// x-coordinate was not a valid field element.
    #[error("invalid point encoding")]
    PointInvalid,

    /// A field element was out of range, or a required inverse did not exist.
    #[error("invalid field element")]
    FieldInvalid,

    /// A scalar was out of the `[0, n)` range required by the group order.
    #[error("scalar out of range")]
    ScalarOutOfRange,
}

/// Errors from the recovery-id resolver (Component D).
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryError {
    /// Neither `v = 0` nor `v = 1` recovered the expected public key.
    #[error("recovery failed: no candidate v recovers the expected key")]
    RecoveryFailed,

    /// A lower-level field/point error occurred while recovering.
    #[error(transparent)]
    Field(#[from] FieldError),
}

/// Crate-wide error, composing every component's error taxonomy.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration errors (§7).
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Frame errors (§7).
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// Crypto errors (§7).
    #[error(transparent)]
    Field(#[from] FieldError),

    /// Keygen protocol errors (§7).
    #[error(transparent)]
    Keygen(#[from] KeygenError),

    /// Signing protocol errors (§7).
    #[error(transparent)]
    Sign(#[from] SignError),

    /// Recovery errors (§7).
    #[error(transparent)]
    Recovery(#[from] RecoveryError),
}
