// Copyright (c) Silence Laboratories Pte. Ltd. All Rights Reserved.
// This software is licensed under the Silence Laboratories License Agreement.

//! Field and curve primitives for secp256k1 (Component A).
//!
//! This module does not reimplement big-integer arithmetic; every operation
//! here is a thin orchestration of `k256`'s constant-time field, scalar and
//! point types, matching how the rest of the crate leans on `k256` rather
//! than hand-rolled bignums. The one piece of real math this module owns is
//! point decompression, written out explicitly rather than delegated to
//! `AffinePoint::decompress` — secp256k1's prime is `3 mod 4`, so a square
//! root is a single modular exponentiation, and `spec.md` treats that
//! shortcut as documentation worth keeping visible in the crate rather than
//! hidden behind a library call.

use k256::elliptic_curve::{
    sec1::{FromEncodedPoint, ToEncodedPoint},
    subtle::{Choice, ConditionallySelectable, ConstantTimeEq},
    PrimeField,
};
pub use k256::{AffinePoint, EncodedPoint, FieldBytes, FieldElement, ProjectivePoint, Scalar};

use crate::error::FieldError;

/// The secp256k1 curve equation constant `b` in `y^2 = x^3 + a*x + b` (`a = 0`).
///
/// `k256` keeps its own copy of this constant private, so it is rebuilt here
/// from `FieldElement::ONE` rather than encoding the literal `7` by hand.
fn curve_b() -> FieldElement {
    let mut b = FieldElement::ZERO;
    for _ in 0..7 {
        b += FieldElement::ONE;
    }
    b
}

/// Compute `sqrt(alpha)` using the `p = 3 (mod 4)` shortcut
/// `beta = alpha^((p+1)/4)`, returning `None` if `alpha` has no square root.
///
/// `FieldElement::sqrt` already implements this exponentiation; this
/// function exists so callers have one named place documenting *why* a
/// single call suffices for this curve, rather than a generic square-root
/// algorithm that would need to handle other primes mod 8.
fn sqrt_mod_p(alpha: &FieldElement) -> Option<FieldElement> {
    Option::from(alpha.sqrt())
}

/// Recover the affine point `(x, y)` on secp256k1 given `x` and the parity
/// of `y`, i.e. undo SEC1 point compression.
///
/// Implements `y^2 = x^3 + 7`, `beta = alpha^((p+1)/4)`, then selects `beta`
/// or `-beta` to match `y_is_odd`. Returns [`FieldError::PointInvalid`] if
/// `x >= p` (not a valid field element) and likewise
/// [`FieldError::PointInvalid`] if `x^3 + 7` has no square root (`x` is not
/// the abscissa of any curve point) — `spec.md` §4.A step 1 rejects both
/// cases as `PointInvalid`.
pub fn decompress_point(
    x_bytes: &FieldBytes,
    y_is_odd: bool,
) -> Result<AffinePoint, FieldError> {
    let x = Option::<FieldElement>::from(FieldElement::from_bytes(x_bytes))
        .ok_or(FieldError::PointInvalid)?;

    let alpha = x.square() * x + curve_b();
    let beta = sqrt_mod_p(&alpha).ok_or(FieldError::PointInvalid)?;
    let beta = beta.normalize();

    let y = FieldElement::conditional_select(
        &beta.negate(1).normalize(),
        &beta,
        !(beta.is_odd() ^ Choice::from(y_is_odd as u8)),
    );

    let encoded =
        EncodedPoint::from_affine_coordinates(&x.to_bytes(), &y.normalize().to_bytes(), false);

    Option::from(AffinePoint::from_encoded_point(&encoded)).ok_or(FieldError::PointInvalid)
}

/// Parse a point from any of the three encodings `spec.md` §4.A accepts:
/// SEC1 compressed (33 bytes, `0x02`/`0x03` prefix), SEC1 uncompressed (65
/// bytes, `0x04` prefix), or bare `x || y` (64 bytes, no prefix). All three
/// forms are checked against the curve equation; nothing is assumed valid
/// just because it parsed.
pub fn point_from_bytes(bytes: &[u8]) -> Result<AffinePoint, FieldError> {
    match bytes.len() {
        33 => {
            let prefix = bytes[0];
            if prefix != 0x02 && prefix != 0x03 {
                return Err(FieldError::PointInvalid);
            }
            let x = FieldBytes::clone_from_slice(&bytes[1..33]);
            decompress_point(&x, prefix == 0x03)
        }
        65 => {
            if bytes[0] != 0x04 {
                return Err(FieldError::PointInvalid);
            }
            let encoded = EncodedPoint::from_bytes(bytes).map_err(|_| FieldError::PointInvalid)?;
            Option::from(AffinePoint::from_encoded_point(&encoded)).ok_or(FieldError::PointInvalid)
        }
        64 => {
            let x = FieldBytes::clone_from_slice(&bytes[0..32]);
            let y = FieldBytes::clone_from_slice(&bytes[32..64]);
            let encoded = EncodedPoint::from_affine_coordinates(&x, &y, false);
            Option::from(AffinePoint::from_encoded_point(&encoded)).ok_or(FieldError::PointInvalid)
        }
        _ => Err(FieldError::PointInvalid),
    }
}

/// SEC1-compress a point to its canonical 33-byte form.
pub fn point_to_bytes(point: &AffinePoint) -> [u8; 33] {
    let encoded = point.to_encoded_point(true);
    let mut out = [0u8; 33];
    out.copy_from_slice(encoded.as_bytes());
    out
}

/// Parse a scalar from its 32-byte big-endian encoding, rejecting values
/// outside `[0, n)` for the group order `n`.
pub fn scalar_from_bytes(bytes: &[u8; 32]) -> Result<Scalar, FieldError> {
    let repr = FieldBytes::clone_from_slice(bytes);
    Option::from(Scalar::from_repr_vartime(repr)).ok_or(FieldError::ScalarOutOfRange)
}

/// `true` if `point` is the point at infinity.
pub fn is_identity(point: &ProjectivePoint) -> bool {
    point.ct_eq(&ProjectivePoint::IDENTITY).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::elliptic_curve::group::prime::PrimeCurveAffine;

    #[test]
    fn generator_round_trips_through_compression() {
        let g = AffinePoint::generator();
        let bytes = point_to_bytes(&g);
        let parsed = point_from_bytes(&bytes).unwrap();
        assert_eq!(g, parsed);
    }

    #[test]
    fn uncompressed_and_bare_encodings_agree_with_compressed() {
        let g = AffinePoint::generator();
        let encoded = g.to_encoded_point(false);
        let uncompressed = point_from_bytes(encoded.as_bytes()).unwrap();
        assert_eq!(g, uncompressed);

        let bare: Vec<u8> = encoded.as_bytes()[1..].to_vec();
        let from_bare = point_from_bytes(&bare).unwrap();
        assert_eq!(g, from_bare);
    }

    #[test]
    fn rejects_x_with_no_square_root() {
        // x = 0 is not the abscissa of any secp256k1 point (0^3 + 7 = 7 is
        // not a quadratic residue mod p).
        let x = FieldBytes::default();
        assert_eq!(decompress_point(&x, false), Err(FieldError::PointInvalid));
    }

    #[test]
    fn rejects_wrong_length_encoding() {
        assert_eq!(point_from_bytes(&[0u8; 10]), Err(FieldError::PointInvalid));
    }

    #[test]
    fn scalar_rejects_out_of_range_value() {
        let max = [0xffu8; 32];
        assert_eq!(scalar_from_bytes(&max), Err(FieldError::ScalarOutOfRange));
    }
}
