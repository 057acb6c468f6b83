//! JWT algorithm allow-list
//!
//! Every token, credential or mirror challenge, is checked against this list
//! before any signature work happens. Only the instance key's algorithm is
//! accepted.

use crate::error::TokenRejection;

/// Algorithms that are never accepted.
///
/// - `none`: no signature at all
/// - `HS256`, `HS384`, `HS512`: symmetric, would let the public key act as an HMAC secret
pub const FORBIDDEN_ALGORITHMS: &[&str] = &["none", "HS256", "HS384", "HS512"];

/// Accepted algorithms. The instance key is Ed25519, so only EdDSA.
pub const ACCEPTED_ALGORITHMS: &[&str] = &[hoard_core::SIGNING_ALGORITHM];

/// Validate a JWT header algorithm against the allow-list
pub fn validate_algorithm(alg: &str) -> Result<(), TokenRejection> {
    if FORBIDDEN_ALGORITHMS.iter().any(|f| f.eq_ignore_ascii_case(alg)) {
        return Err(TokenRejection::UnsupportedAlgorithm(format!(
            "Algorithm '{}' is not allowed",
            alg
        )));
    }

    if !ACCEPTED_ALGORITHMS.contains(&alg) {
        return Err(TokenRejection::UnsupportedAlgorithm(format!(
            "Algorithm '{}' is not in the accepted list",
            alg
        )));
    }

    Ok(())
}

/// Read the header of a compact JWT and validate its algorithm
pub fn check_header(token: &str) -> Result<jsonwebtoken::Header, TokenRejection> {
    // `none` is not a jsonwebtoken `Algorithm`, so unparsable headers are
    // refused here as well
    let header = jsonwebtoken::decode_header(token)
        .map_err(|e| TokenRejection::Malformed(e.to_string()))?;
    validate_algorithm(&format!("{:?}", header.alg))?;
    Ok(header)
}
