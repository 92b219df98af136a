//! Secret wrappers and the at-rest encryption cipher for long-lived secrets.

// crates.io
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use ring::{
	aead::{AES_256_GCM, Aad, LessSafeKey, NONCE_LEN, Nonce, UnboundKey},
	rand::{SecureRandom, SystemRandom},
};
// self
use crate::_prelude::*;

/// Redacted token secret wrapper keeping sensitive material out of logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSecret(String);
impl TokenSecret {
	/// Wraps a new secret string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the inner token value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}
}
impl AsRef<str> for TokenSecret {
	fn as_ref(&self) -> &str {
		self.expose()
	}
}
impl Debug for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("TokenSecret").field(&"<redacted>").finish()
	}
}
impl Display for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

/// Authenticated ciphertext produced by [`SecretCipher::seal`].
///
/// Encodes `nonce || ciphertext || tag` as base64. The value is opaque to every
/// component except the cipher; stores persist and compare it byte-for-byte.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SealedSecret(String);
impl SealedSecret {
	/// Wraps an already-encoded sealed payload (e.g. loaded from a store).
	pub fn from_encoded(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the base64 payload for persistence.
	pub fn encoded(&self) -> &str {
		&self.0
	}
}
impl Debug for SealedSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("SealedSecret").field(&"<sealed>").finish()
	}
}

/// Failure to recover plaintext from a [`SealedSecret`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum DecryptionError {
	/// Payload is not valid base64 or is too short to contain a nonce and tag.
	#[error("Sealed secret payload is malformed.")]
	Malformed,
	/// Authentication failed: the payload was sealed under a different key or corrupted.
	#[error("Sealed secret could not be authenticated with the configured key.")]
	Unauthenticated,
	/// Decrypted bytes are not valid UTF-8.
	#[error("Sealed secret decrypted to non-UTF-8 bytes.")]
	NotUtf8,
}

/// Error raised while constructing a [`SecretCipher`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum CipherKeyError {
	/// Key material is not valid base64.
	#[error("Cipher key is not valid base64.")]
	InvalidEncoding,
	/// Key material is not exactly 32 bytes.
	#[error("Cipher key must be exactly {expected} bytes, got {actual}.")]
	InvalidLength {
		/// Required key size in bytes.
		expected: usize,
		/// Provided key size in bytes.
		actual: usize,
	},
}

const KEY_LEN: usize = 32;

/// Process-wide symmetric cipher (AES-256-GCM) for long-lived secrets at rest.
///
/// One key is loaded at startup; rotation is an external operation outside this
/// crate. Sealing uses a fresh random nonce per call, so sealing the same
/// plaintext twice yields different ciphertexts.
#[derive(Clone)]
pub struct SecretCipher {
	key_bytes: Arc<[u8; KEY_LEN]>,
	rng: SystemRandom,
}
impl SecretCipher {
	/// Builds a cipher from raw key bytes (must be exactly 32 bytes).
	pub fn new(key_bytes: &[u8]) -> Result<Self, CipherKeyError> {
		let key_bytes: [u8; KEY_LEN] = key_bytes
			.try_into()
			.map_err(|_| CipherKeyError::InvalidLength { expected: KEY_LEN, actual: key_bytes.len() })?;

		Ok(Self { key_bytes: Arc::new(key_bytes), rng: SystemRandom::new() })
	}

	/// Builds a cipher from a base64-encoded 32-byte key.
	pub fn from_base64(encoded: &str) -> Result<Self, CipherKeyError> {
		let bytes = BASE64.decode(encoded).map_err(|_| CipherKeyError::InvalidEncoding)?;

		Self::new(&bytes)
	}

	/// Encrypts a secret into an authenticated, base64-encoded payload.
	pub fn seal(&self, secret: &TokenSecret) -> SealedSecret {
		let key = self.aead_key();
		let mut nonce_bytes = [0_u8; NONCE_LEN];

		self.rng.fill(&mut nonce_bytes).expect("OS entropy source should be available.");

		let nonce = Nonce::assume_unique_for_key(nonce_bytes);
		let mut buf = secret.expose().as_bytes().to_vec();

		key.seal_in_place_append_tag(nonce, Aad::empty(), &mut buf)
			.expect("AES-256-GCM sealing should not fail for in-memory buffers.");

		let mut payload = Vec::with_capacity(NONCE_LEN + buf.len());

		payload.extend_from_slice(&nonce_bytes);
		payload.extend_from_slice(&buf);

		SealedSecret(BASE64.encode(payload))
	}

	/// Decrypts a sealed payload, failing with a typed error on any mismatch.
	pub fn open(&self, sealed: &SealedSecret) -> Result<TokenSecret, DecryptionError> {
		let payload = BASE64.decode(&sealed.0).map_err(|_| DecryptionError::Malformed)?;

		if payload.len() < NONCE_LEN + AES_256_GCM.tag_len() {
			return Err(DecryptionError::Malformed);
		}

		let (nonce_bytes, ciphertext) = payload.split_at(NONCE_LEN);
		let nonce_bytes: [u8; NONCE_LEN] =
			nonce_bytes.try_into().map_err(|_| DecryptionError::Malformed)?;
		let nonce = Nonce::assume_unique_for_key(nonce_bytes);
		let key = self.aead_key();
		let mut buf = ciphertext.to_vec();
		let plaintext =
			key.open_in_place(nonce, Aad::empty(), &mut buf).map_err(|_| DecryptionError::Unauthenticated)?;
		let value = std::str::from_utf8(plaintext).map_err(|_| DecryptionError::NotUtf8)?;

		Ok(TokenSecret::new(value))
	}

	fn aead_key(&self) -> LessSafeKey {
		let unbound = UnboundKey::new(&AES_256_GCM, self.key_bytes.as_ref())
			.expect("Key length is validated at construction.");

		LessSafeKey::new(unbound)
	}
}
impl Debug for SecretCipher {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("SecretCipher").field(&"<redacted>").finish()
	}
}
