//! Proof Key for Code Exchange (RFC 7636) verifier/challenge pairs.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::Rng;
use sha2::{Digest, Sha256};
// self
use crate::{_prelude::*, protocol::TokenSecret};

const VERIFIER_ENTROPY_BYTES: usize = 32;

/// Supported PKCE challenge methods.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum PkceCodeChallengeMethod {
	/// SHA-256 based PKCE (RFC 7636 S256).
	S256,
}
impl PkceCodeChallengeMethod {
	/// Returns the RFC 7636 identifier for the challenge method.
	pub fn as_str(self) -> &'static str {
		match self {
			PkceCodeChallengeMethod::S256 => "S256",
		}
	}
}

/// Immutable verifier/challenge pair.
///
/// The challenge and method travel with the authorization request; the verifier stays in
/// memory until the token exchange and is skipped when the pair is serialized.
#[derive(Clone, Debug, Serialize)]
pub struct PkceChallenge {
	#[serde(skip)]
	code_verifier: TokenSecret,
	code_challenge: String,
	code_challenge_method: PkceCodeChallengeMethod,
}
impl PkceChallenge {
	/// Generates a fresh pair from 32 bytes of OS-seeded randomness.
	pub fn new_challenge() -> Self {
		let mut entropy = [0_u8; VERIFIER_ENTROPY_BYTES];

		rand::rng().fill(&mut entropy);

		Self::from_verifier(URL_SAFE_NO_PAD.encode(entropy))
	}

	/// Derives the S256 challenge for an existing verifier.
	pub fn from_verifier(verifier: impl Into<String>) -> Self {
		let verifier = verifier.into();
		let code_challenge = compute_challenge(&verifier);

		Self {
			code_verifier: TokenSecret::new(verifier),
			code_challenge,
			code_challenge_method: PkceCodeChallengeMethod::S256,
		}
	}

	/// Secret verifier sent only with the token exchange.
	pub fn code_verifier(&self) -> &str {
		self.code_verifier.expose()
	}

	/// Base64url SHA-256 digest of the verifier.
	pub fn code_challenge(&self) -> &str {
		&self.code_challenge
	}

	/// Challenge method (always `S256`).
	pub fn code_challenge_method(&self) -> PkceCodeChallengeMethod {
		self.code_challenge_method
	}
}

fn compute_challenge(verifier: &str) -> String {
	let digest = Sha256::digest(verifier.as_bytes());

	URL_SAFE_NO_PAD.encode(digest)
}
