//! Session-key protected token exchange.
//!
//! Requests travel as an HS256-signed compact JWT in the `request` form field; successful
//! responses arrive as a compact JWE encrypted with AES-256-GCM. Both directions use a key derived
//! from the session key with the SP 800-108 counter-mode KDF (HMAC-SHA256), over a random context
//! for requests and the context named in the JWE header for responses.

// crates.io
use aes_gcm::{
	Aes256Gcm, Nonce,
	aead::{Aead, KeyInit, Payload},
};
use base64::{
	Engine as _,
	engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
};
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde_json::{Map, Value};
use sha2::Sha256;
// self
use crate::{
	_prelude::*,
	account::Account,
	cache::CacheRecord,
	error::{ClientError, ClientErrorKind},
	http::HttpResponse,
	protocol::{
		AuthenticationScheme, AuthorizationRequest, AuthorizationResponse, GrantType, TokenRequest,
		TokenResponse, TokenResult,
	},
	strategy::{OAuth2Provider, ProviderContext, TokenGrant},
	sts::{MicrosoftStsProvider, token_result},
};

type HmacSha256 = Hmac<Sha256>;

/// KDF label shared by both directions.
pub const KDF_LABEL: &str = "AzureAD-SecureConversation";
/// Version of the signed request protocol.
pub const PRT_PROTOCOL_VERSION: &str = "3.0";

const KEY_LEN: usize = 32;
const REQUEST_CONTEXT_LEN: usize = 256;
const GCM_IV_LEN: usize = 12;
const CBC_IV_LEN: usize = 16;

/// 256-bit session key shared with the token endpoint.
#[derive(Clone)]
pub struct SessionKey([u8; KEY_LEN]);
impl SessionKey {
	/// Wraps raw key bytes; anything but 32 bytes is rejected.
	pub fn new(bytes: &[u8]) -> Result<Self> {
		let key = <[u8; KEY_LEN]>::try_from(bytes).map_err(|_| {
			ClientError::new(
				ClientErrorKind::KeyManager,
				format!("session key must be {KEY_LEN} bytes, got {}", bytes.len()),
			)
		})?;

		Ok(Self(key))
	}

	/// Derives the 256-bit key for `context`.
	pub fn derive(&self, context: &[u8]) -> Result<[u8; KEY_LEN]> {
		let mut mac = new_mac(&self.0)?;

		mac.update(&1_u32.to_be_bytes());
		mac.update(KDF_LABEL.as_bytes());
		mac.update(&[0]);
		mac.update(context);
		mac.update(&((KEY_LEN * 8) as u32).to_be_bytes());

		let mut key = [0_u8; KEY_LEN];

		key.copy_from_slice(&mac.finalize().into_bytes());

		Ok(key)
	}
}
impl Debug for SessionKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("SessionKey(..)")
	}
}

#[derive(Debug, Deserialize)]
struct JweHeader {
	#[serde(default)]
	enc: String,
	#[serde(default)]
	ctx: String,
}

/// Microsoft STS dialect with a session-key protected envelope.
#[derive(Clone, Debug)]
pub struct MicrosoftStsJweProvider {
	inner: MicrosoftStsProvider,
	session_key: SessionKey,
}
impl MicrosoftStsJweProvider {
	/// Creates a provider using `session_key` for both directions.
	pub fn new(session_key: SessionKey) -> Self {
		Self { inner: MicrosoftStsProvider, session_key }
	}

	/// Builds the signed `request` JWT carrying `pairs` under a fresh random context.
	pub fn sign_request(&self, pairs: &[(String, String)]) -> Result<String> {
		let mut context = [0_u8; REQUEST_CONTEXT_LEN];

		rand::rng().fill_bytes(&mut context);

		let header = serde_json::json!({
			"alg": "HS256",
			"ctx": URL_SAFE_NO_PAD.encode(context),
			"typ": "JWT",
		});
		let body: Map<String, Value> =
			pairs.iter().map(|(k, v)| (k.clone(), Value::String(v.clone()))).collect();
		let signing_input = format!(
			"{}.{}",
			URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header).map_err(ClientError::from)?),
			URL_SAFE_NO_PAD.encode(serde_json::to_vec(&body).map_err(ClientError::from)?)
		);
		let mut mac = new_mac(&self.session_key.derive(&context)?)?;

		mac.update(signing_input.as_bytes());

		let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

		Ok(format!("{signing_input}.{signature}"))
	}

	/// Decrypts a compact JWE token response.
	///
	/// The header must declare `A256GCM` or `dir`; this is checked before any key material is
	/// touched. The service seals responses without additional authenticated data.
	pub fn decrypt_response(&self, jwe: &str) -> Result<Vec<u8>> {
		let parts: Vec<&str> = jwe.trim().split('.').collect();
		let [header_b64, _encrypted_key, iv, ciphertext, tag] = parts.as_slice() else {
			return Err(invalid_jwe(format!("expected 5 segments, got {}", parts.len())));
		};
		let header_json = decode_url(header_b64, "header")?;
		let header: JweHeader = serde_json::from_slice(&header_json).map_err(|e| {
			ClientError::with_source(ClientErrorKind::InvalidJwe, "header is not JSON", e)
		})?;

		if !header.enc.eq_ignore_ascii_case("A256GCM") && !header.enc.eq_ignore_ascii_case("dir") {
			return Err(invalid_jwe(format!("unsupported encryption algorithm `{}`", header.enc)));
		}

		let context = STANDARD
			.decode(header.ctx.trim())
			.map_err(|e| ClientError::with_source(ClientErrorKind::InvalidJwe, "ctx is not base64", e))?;
		let iv = decode_url(iv, "iv")?;

		match iv.len() {
			GCM_IV_LEN => {},
			CBC_IV_LEN => return Err(invalid_jwe("CBC encrypted responses are not supported")),
			other => return Err(invalid_jwe(format!("unexpected IV length {other}"))),
		}

		let mut sealed = decode_url(ciphertext, "ciphertext")?;

		sealed.extend(decode_url(tag, "tag")?);

		let cipher = Aes256Gcm::new_from_slice(&self.session_key.derive(&context)?)
			.map_err(|e| decryption_error(format!("failed to create cipher: {e}")))?;

		cipher
			.decrypt(Nonce::from_slice(&iv), Payload { msg: &sealed, aad: &[] })
			.map_err(|e| decryption_error(format!("authenticated decryption failed: {e}")))
	}

	/// Seals `plaintext` into a compact JWE the way the token endpoint does.
	pub fn encrypt_response(&self, plaintext: &[u8], context: &[u8]) -> Result<String> {
		let header = serde_json::json!({ "alg": "dir", "ctx": STANDARD.encode(context), "enc": "A256GCM" });
		let header_b64 =
			URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header).map_err(ClientError::from)?);
		let mut iv = [0_u8; GCM_IV_LEN];

		rand::rng().fill_bytes(&mut iv);

		let cipher = Aes256Gcm::new_from_slice(&self.session_key.derive(context)?)
			.map_err(|e| decryption_error(format!("failed to create cipher: {e}")))?;
		let mut sealed = cipher
			.encrypt(Nonce::from_slice(&iv), Payload { msg: plaintext, aad: &[] })
			.map_err(|e| decryption_error(format!("encryption failed: {e}")))?;
		let tag = sealed.split_off(sealed.len() - 16);

		Ok(format!(
			"{header_b64}..{}.{}.{}",
			URL_SAFE_NO_PAD.encode(iv),
			URL_SAFE_NO_PAD.encode(sealed),
			URL_SAFE_NO_PAD.encode(tag)
		))
	}
}
impl OAuth2Provider for MicrosoftStsJweProvider {
	fn validate_authorization_request(&self, request: &AuthorizationRequest) -> Result<()> {
		self.inner.validate_authorization_request(request)
	}

	fn validate_token_request(&self, request: &TokenRequest) -> Result<()> {
		self.inner.validate_token_request(request)
	}

	fn create_token_request(
		&self,
		ctx: ProviderContext<'_>,
		request: &AuthorizationRequest,
		response: &AuthorizationResponse,
	) -> Result<TokenRequest> {
		self.inner.create_token_request(ctx, request, response)
	}

	fn create_grant_request(
		&self,
		ctx: ProviderContext<'_>,
		client_id: &str,
		grant: TokenGrant,
		scope: Option<String>,
		scheme: &AuthenticationScheme,
	) -> Result<TokenRequest> {
		self.inner.create_grant_request(ctx, client_id, grant, scope, scheme)
	}

	fn encode_token_request(
		&self,
		ctx: ProviderContext<'_>,
		request: &TokenRequest,
	) -> Result<Vec<(String, String)>> {
		let signed = self.sign_request(&self.inner.encode_token_request(ctx, request)?)?;
		// `client_info` must also sit outside the signed request for the service to return it.
		let form = BTreeMap::from([
			("client_info", "1".to_owned()),
			("grant_type", GrantType::JwtBearer.as_str().to_owned()),
			("prt_protocol_version", PRT_PROTOCOL_VERSION.to_owned()),
			("request", signed),
		]);

		Ok(form.into_iter().map(|(k, v)| (k.to_owned(), v)).collect())
	}

	fn decode_success_body(&self, body: &[u8]) -> Result<Vec<u8>> {
		let jwe = std::str::from_utf8(body).map_err(|e| {
			ClientError::with_source(ClientErrorKind::UnsupportedEncoding, "JWE body is not UTF-8", e)
		})?;

		self.decrypt_response(jwe)
	}

	fn token_result_from_http_response(
		&self,
		ctx: ProviderContext<'_>,
		response: &HttpResponse,
	) -> Result<TokenResult> {
		token_result(ctx, response, &|body: &[u8]| self.decode_success_body(body))
	}

	fn validate_token_response(&self, request: &TokenRequest, result: &TokenResult) -> Result<()> {
		self.inner.validate_token_response(request, result)
	}

	fn validate_cached_result(
		&self,
		ctx: ProviderContext<'_>,
		scheme: &AuthenticationScheme,
		record: &CacheRecord,
	) -> bool {
		self.inner.validate_cached_result(ctx, scheme, record)
	}

	fn create_account(&self, ctx: ProviderContext<'_>, response: &TokenResponse) -> Result<Account> {
		self.inner.create_account(ctx, response)
	}

	fn challenge_response_header(
		&self,
		ctx: ProviderContext<'_>,
		challenge: &str,
	) -> Result<Option<String>> {
		self.inner.challenge_response_header(ctx, challenge)
	}
}

fn new_mac(key: &[u8]) -> Result<HmacSha256> {
	<HmacSha256 as Mac>::new_from_slice(key).map_err(|e| {
		ClientError::new(ClientErrorKind::KeyManager, format!("HMAC key was rejected: {e}")).into()
	})
}

fn decode_url(segment: &str, name: &str) -> Result<Vec<u8>> {
	URL_SAFE_NO_PAD.decode(segment.trim_end_matches('=')).map_err(|e| {
		ClientError::with_source(ClientErrorKind::InvalidJwe, format!("{name} is not base64url"), e)
			.into()
	})
}

fn invalid_jwe(message: impl Into<String>) -> Error {
	ClientError::new(ClientErrorKind::InvalidJwe, message).into()
}

fn decryption_error(message: impl Into<String>) -> Error {
	ClientError::new(ClientErrorKind::JweDecryption, message).into()
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn provider() -> MicrosoftStsJweProvider {
		MicrosoftStsJweProvider::new(SessionKey::new(&[7; 32]).expect("Key fixture should be valid."))
	}

	#[test]
	fn session_key_requires_256_bits() {
		let err = SessionKey::new(&[1; 16]).expect_err("Short keys should be rejected.");

		assert_eq!(err.client_kind(), Some(ClientErrorKind::KeyManager));
	}

	#[test]
	fn derived_keys_depend_on_context() {
		let key = SessionKey::new(&[7; 32]).expect("Key fixture should be valid.");
		let a = key.derive(b"context-a").expect("Derivation should succeed.");
		let b = key.derive(b"context-b").expect("Derivation should succeed.");

		assert_ne!(a, b);
		assert_eq!(a, key.derive(b"context-a").expect("Derivation should succeed."));
	}

	// HMAC-SHA256(0x07 * 32, BE32(1) || "AzureAD-SecureConversation" || 0x00 || ctx || BE32(256)).
	const FIXED_CONTEXT: &[u8] = b"fixed-derivation-context";
	const FIXED_DERIVED_KEY: [u8; KEY_LEN] = [
		0x61, 0x9b, 0xe8, 0xab, 0x3b, 0xf7, 0x5f, 0x2d, 0xd6, 0x2d, 0xf4, 0x8f, 0xf9, 0x32, 0xb5,
		0x77, 0x91, 0x83, 0xcd, 0x98, 0xd7, 0x6f, 0xb0, 0xbe, 0x20, 0xd7, 0x1c, 0x75, 0x4c, 0x5b,
		0x1c, 0x10,
	];

	#[test]
	fn derivation_matches_known_answer() {
		let key = SessionKey::new(&[7; 32]).expect("Key fixture should be valid.");

		assert_eq!(key.derive(FIXED_CONTEXT).expect("Derivation should succeed."), FIXED_DERIVED_KEY);
	}

	#[test]
	fn response_sealed_without_aad_decrypts() {
		let plaintext = br#"{"access_token":"at","token_type":"Bearer"}"#;
		let iv = [3_u8; GCM_IV_LEN];
		let cipher =
			Aes256Gcm::new_from_slice(&FIXED_DERIVED_KEY).expect("Known key should build a cipher.");
		let mut sealed = cipher
			.encrypt(Nonce::from_slice(&iv), Payload { msg: plaintext, aad: &[] })
			.expect("Sealing should succeed.");
		let tag = sealed.split_off(sealed.len() - 16);
		let header = URL_SAFE_NO_PAD.encode(format!(
			r#"{{"alg":"dir","enc":"A256GCM","ctx":"{}"}}"#,
			STANDARD.encode(FIXED_CONTEXT)
		));
		let jwe = format!(
			"{header}..{}.{}.{}",
			URL_SAFE_NO_PAD.encode(iv),
			URL_SAFE_NO_PAD.encode(&sealed),
			URL_SAFE_NO_PAD.encode(&tag)
		);

		assert_eq!(
			provider().decrypt_response(&jwe).expect("Service-shaped response should decrypt."),
			plaintext
		);
	}

	#[test]
	fn response_round_trips_through_the_envelope() {
		let provider = provider();
		let jwe = provider
			.encrypt_response(br#"{"access_token":"at"}"#, b"server-context")
			.expect("Encryption should succeed.");
		let plain = provider.decrypt_response(&jwe).expect("Decryption should succeed.");

		assert_eq!(plain, br#"{"access_token":"at"}"#);

		let other = MicrosoftStsJweProvider::new(
			SessionKey::new(&[8; 32]).expect("Key fixture should be valid."),
		);
		let err = other.decrypt_response(&jwe).expect_err("A different key should fail.");

		assert_eq!(err.client_kind(), Some(ClientErrorKind::JweDecryption));
	}

	#[test]
	fn unsupported_algorithms_and_cbc_are_rejected() {
		let provider = provider();
		let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"dir","enc":"A128CBC-HS256","ctx":"AA=="}"#);
		let err = provider
			.decrypt_response(&format!("{header}..AAAA.AAAA.AAAA"))
			.expect_err("CBC header should fail.");

		assert_eq!(err.client_kind(), Some(ClientErrorKind::InvalidJwe));

		let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"dir","enc":"A256GCM","ctx":"AA=="}"#);
		let iv = URL_SAFE_NO_PAD.encode([0_u8; 16]);
		let err = provider
			.decrypt_response(&format!("{header}..{iv}.AAAA.AAAA"))
			.expect_err("A 16-byte IV should fail.");

		assert_eq!(err.client_kind(), Some(ClientErrorKind::InvalidJwe));

		let err = provider.decrypt_response("a.b.c").expect_err("Three segments should fail.");

		assert_eq!(err.client_kind(), Some(ClientErrorKind::InvalidJwe));
	}

	#[test]
	fn signed_request_verifies_with_the_derived_key() {
		let provider = provider();
		let jwt = provider
			.sign_request(&[("grant_type".into(), "refresh_token".into())])
			.expect("Signing should succeed.");
		let segments: Vec<&str> = jwt.split('.').collect();
		let header: Value = serde_json::from_slice(
			&URL_SAFE_NO_PAD.decode(segments[0]).expect("Header should be base64url."),
		)
		.expect("Header should be JSON.");
		let context = URL_SAFE_NO_PAD
			.decode(header["ctx"].as_str().expect("Header should carry ctx."))
			.expect("Context should be base64url.");
		let mut mac = new_mac(&provider.session_key.derive(&context).expect("Derivation should succeed."))
			.expect("MAC should build.");

		mac.update(format!("{}.{}", segments[0], segments[1]).as_bytes());

		assert_eq!(header["alg"], "HS256");
		assert_eq!(context.len(), REQUEST_CONTEXT_LEN);
		assert_eq!(
			URL_SAFE_NO_PAD.decode(segments[2]).expect("Signature should be base64url."),
			mac.finalize().into_bytes().to_vec()
		);
	}
}
