// Copyright (c) Silence Laboratories Pte. Ltd. All Rights Reserved.
// This software is licensed under the Silence Laboratories License Agreement.

//! Wire framing and routing (Component E).
//!
//! [`Frame`] is the transport-agnostic analogue of the teacher's
//! wasm-bindgen `Message` type: a source id, an optional destination
//! (`None` means broadcast), and an opaque payload. Unlike the wasm type,
//! nothing here reaches for a JS boundary — there is none in scope — so the
//! payload is plain `Vec<u8>` and the codec is `ciborium` end to end, with
//! `base64` available for callers that need to move frames through a
//! text-only transport.

use std::collections::HashSet;

use base64::Engine;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{error::FrameError, ids::PartyId};

/// A framed protocol message: who sent it, who it's for (`None` = broadcast
/// to every other party), and its encoded payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub from: PartyId,
    pub to: Option<PartyId>,
    pub payload: Vec<u8>,
}

/// Implemented by every round message type (`KeygenMsg1..4`, `SignMsg1..4`)
/// so a [`Frame`] can be built from it without the caller repeating routing
/// metadata that the message itself already carries.
pub trait MessageRouting {
    fn src_party_id(&self) -> PartyId;
    fn dst_party_id(&self) -> Option<PartyId>;
}

impl Frame {
    /// Encode `payload` (CBOR) into a [`Frame`], reading routing metadata
    /// off the payload itself.
    pub fn new<T: Serialize + MessageRouting>(payload: &T) -> Self {
        let mut buffer = Vec::new();
        ciborium::into_writer(payload, &mut buffer)
            .expect("CBOR encode of an in-memory message cannot fail");

        Self {
            from: payload.src_party_id(),
            to: payload.dst_party_id(),
            payload: buffer,
        }
    }

    /// Decode this frame's payload as `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, FrameError> {
        ciborium::from_reader(self.payload.as_slice()).map_err(|_| FrameError::FrameMalformed)
    }

    /// Base64-encode the whole frame (CBOR-of-[`Frame`], then base64) for
    /// text-only transports.
    pub fn to_base64(&self) -> Result<String, FrameError> {
        let mut buffer = Vec::new();
        ciborium::into_writer(self, &mut buffer).map_err(|_| FrameError::FrameMalformed)?;
        Ok(base64::engine::general_purpose::STANDARD.encode(buffer))
    }

    /// Inverse of [`Frame::to_base64`].
    pub fn from_base64(s: &str) -> Result<Self, FrameError> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(s)
            .map_err(|_| FrameError::FrameMalformed)?;
        ciborium::from_reader(bytes.as_slice()).map_err(|_| FrameError::FrameMalformed)
    }
}

/// Selects and validates the frames a round handler should consume.
///
/// Promotes the `filter_messages`/`select_messages` closures the teacher's
/// own wasm test modules hand-roll per test into a reusable component every
/// session gets, not just tests: callers still assemble the full broadcast
/// set of frames for a round (there is no network layer here — §1 scopes
/// transport out), but `Router` is what rejects frames from strangers,
/// frames that don't belong to this round, and duplicates from a sender who
/// already spoke this round.
#[derive(Debug, Default)]
pub struct Router {
    seen: HashSet<PartyId>,
}

impl Router {
    pub fn new() -> Self {
        Self {
            seen: HashSet::new(),
        }
    }

    /// Keep only broadcast frames (`to == None`) and peer-to-peer frames
    /// `frame.to == Some(self_id)`, excluding anything from `self_id`
    /// itself, in the style of the teacher's `filter_messages` +
    /// `select_messages` combined into one pass. Fails closed on an unknown
    /// sender or a repeated sender.
    pub fn select(
        &mut self,
        frames: &[Frame],
        self_id: PartyId,
        known: &[PartyId],
    ) -> Result<Vec<Frame>, FrameError> {
        let mut out = Vec::with_capacity(frames.len());
        for frame in frames {
            if frame.from == self_id {
                continue;
            }
            match frame.to {
                Some(to) if to != self_id => continue,
                _ => {}
            }
            if !known.contains(&frame.from) {
                return Err(FrameError::FrameFromUnknownParty);
            }
            if !self.seen.insert(frame.from) {
                return Err(FrameError::FrameDuplicate);
            }
            out.push(frame.clone());
        }
        Ok(out)
    }

    /// Reset duplicate tracking for the next round.
    pub fn next_round(&mut self) {
        self.seen.clear();
    }
}

/// `true` if `frame` is addressed to everyone (no explicit recipient).
pub fn is_broadcast(frame: &Frame) -> bool {
    frame.to.is_none()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Ping {
        from: PartyId,
        to: Option<PartyId>,
        nonce: u32,
    }

    impl MessageRouting for Ping {
        fn src_party_id(&self) -> PartyId {
            self.from
        }

        fn dst_party_id(&self) -> Option<PartyId> {
            self.to
        }
    }

    #[test]
    fn frame_round_trips_through_cbor_and_base64() {
        let msg = Ping {
            from: 1,
            to: Some(2),
            nonce: 42,
        };
        let frame = Frame::new(&msg);
        assert_eq!(frame.from, 1);
        assert_eq!(frame.to, Some(2));

        let decoded: Ping = frame.decode().unwrap();
        assert_eq!(decoded, msg);

        let encoded = frame.to_base64().unwrap();
        let round_tripped = Frame::from_base64(&encoded).unwrap();
        assert_eq!(round_tripped, frame);
    }

    #[test]
    fn router_drops_self_and_keeps_broadcast_and_p2p() {
        let known = [0u8, 1, 2];
        let mut router = Router::new();
        let frames = vec![
            Frame {
                from: 0,
                to: None,
                payload: vec![],
            },
            Frame {
                from: 1,
                to: Some(2),
                payload: vec![],
            },
            Frame {
                from: 2,
                to: Some(1),
                payload: vec![],
            },
        ];
        let selected = router.select(&frames, 2, &known).unwrap();
        assert_eq!(selected.len(), 2);
        assert!(selected.iter().all(|f| f.from != 2));
    }

    #[test]
    fn router_rejects_unknown_sender() {
        let known = [0u8, 1];
        let mut router = Router::new();
        let frames = vec![Frame {
            from: 9,
            to: None,
            payload: vec![],
        }];
        assert_eq!(
            router.select(&frames, 0, &known),
            Err(FrameError::FrameFromUnknownParty)
        );
    }

    #[test]
    fn router_rejects_duplicate_sender_in_same_round() {
        let known = [0u8, 1];
        let mut router = Router::new();
        let frames = vec![
            Frame {
                from: 1,
                to: None,
                payload: vec![],
            },
            Frame {
                from: 1,
                to: None,
                payload: vec![],
            },
        ];
        assert_eq!(
            router.select(&frames, 0, &known),
            Err(FrameError::FrameDuplicate)
        );
    }
}
