use aes_gcm::aead::consts::{U12, U16};
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{Aead, Payload};
use aes_gcm::aes::Aes256;
use aes_gcm::{AesGcm, KeyInit};
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use thiserror::Error;
use zeroize::Zeroizing;

pub const KEY_LENGTH: usize = 32;
/// Nonce lengths accepted as-is; 12 is what the gateway sends today.
pub const SUPPORTED_NONCE_LENGTHS: [usize; 2] = [12, 16];
pub const TAG_LENGTH: usize = 16;

/// Errors produced while opening AEAD payloads.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("APIv3 key is missing")]
    MissingKey,
    #[error("invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },
    #[error(
        "unsupported nonce length: {actual} bytes, expected one of {SUPPORTED_NONCE_LENGTHS:?}"
    )]
    InvalidNonceLength { actual: usize },
    #[error("ciphertext shorter than the {TAG_LENGTH}-byte authentication tag")]
    CiphertextTooShort,
    #[error("authentication tag mismatch")]
    TagMismatch,
    #[error("encryption failure")]
    EncryptFailure,
    #[error("base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),
    #[error("decrypted payload is not valid UTF-8")]
    InvalidUtf8,
}

/// The merchant's APIv3 key: 32 ASCII characters used verbatim as the AES-256 key.
#[derive(Clone)]
pub struct ApiV3Key(Zeroizing<[u8; KEY_LENGTH]>);

impl ApiV3Key {
    pub fn new(value: &str) -> Result<Self, CryptoError> {
        Self::from_bytes(value.as_bytes())
    }

    pub fn from_bytes<B>(bytes: B) -> Result<Self, CryptoError>
    where
        B: AsRef<[u8]>,
    {
        let slice = bytes.as_ref();
        if slice.is_empty() {
            return Err(CryptoError::MissingKey);
        }
        if slice.len() != KEY_LENGTH {
            return Err(CryptoError::InvalidKeyLength {
                expected: KEY_LENGTH,
                actual: slice.len(),
            });
        }
        let mut array = [0u8; KEY_LENGTH];
        array.copy_from_slice(slice);
        Ok(Self(Zeroizing::new(array)))
    }

    /// Open a base64 ciphertext produced by the gateway.
    pub fn decrypt(
        &self,
        ciphertext_b64: &str,
        nonce: &str,
        associated_data: &str,
    ) -> Result<Vec<u8>, CryptoError> {
        let sealed = BASE64_STANDARD.decode(ciphertext_b64.trim())?;
        open(&self.0, &sealed, nonce.as_bytes(), associated_data.as_bytes())
    }

    pub fn decrypt_to_string(
        &self,
        ciphertext_b64: &str,
        nonce: &str,
        associated_data: &str,
    ) -> Result<String, CryptoError> {
        let plaintext = self.decrypt(ciphertext_b64, nonce, associated_data)?;
        String::from_utf8(plaintext).map_err(|_| CryptoError::InvalidUtf8)
    }
}

impl std::fmt::Debug for ApiV3Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiV3Key")
            .field("bytes", &"***redacted***")
            .finish()
    }
}

/// Decrypt an `AEAD_AES_256_GCM` payload with the raw APIv3 key string.
///
/// The decoded ciphertext carries the 16-byte tag at its end. The nonce and associated
/// data are taken as the literal bytes of the given strings. Nothing is returned unless
/// the tag verifies.
pub fn decrypt_aead(
    ciphertext_b64: &str,
    nonce: &str,
    associated_data: &str,
    key: &str,
) -> Result<Vec<u8>, CryptoError> {
    ApiV3Key::new(key)?.decrypt(ciphertext_b64, nonce, associated_data)
}

/// Same as [`decrypt_aead`], for payloads that are UTF-8 text (PEM, JSON).
pub fn decrypt_aead_to_string(
    ciphertext_b64: &str,
    nonce: &str,
    associated_data: &str,
    key: &str,
) -> Result<String, CryptoError> {
    ApiV3Key::new(key)?.decrypt_to_string(ciphertext_b64, nonce, associated_data)
}

/// Seal `plaintext` the way the gateway does; returns base64 of ciphertext || tag.
#[cfg(any(test, feature = "test-helpers"))]
pub fn encrypt(
    plaintext: &[u8],
    nonce: &str,
    associated_data: &str,
    key: &str,
) -> Result<String, CryptoError> {
    let key = ApiV3Key::new(key)?;
    let nonce = nonce.as_bytes();
    let payload = Payload {
        msg: plaintext,
        aad: associated_data.as_bytes(),
    };
    let sealed = match nonce.len() {
        12 => seal_with::<Aes256Gcm12>(&key.0[..], nonce, payload),
        16 => seal_with::<Aes256Gcm16>(&key.0[..], nonce, payload),
        actual => Err(CryptoError::InvalidNonceLength { actual }),
    }?;
    Ok(BASE64_STANDARD.encode(sealed))
}

type Aes256Gcm12 = AesGcm<Aes256, U12>;
// J0 is derived through GHASH for anything other than a 96-bit nonce.
type Aes256Gcm16 = AesGcm<Aes256, U16>;

fn cipher_for<C: KeyInit>(key: &[u8]) -> Result<C, CryptoError> {
    C::new_from_slice(key).map_err(|_| CryptoError::InvalidKeyLength {
        expected: KEY_LENGTH,
        actual: key.len(),
    })
}

#[cfg(any(test, feature = "test-helpers"))]
fn seal_with<C: KeyInit + Aead>(
    key: &[u8],
    nonce: &[u8],
    payload: Payload<'_, '_>,
) -> Result<Vec<u8>, CryptoError> {
    cipher_for::<C>(key)?
        .encrypt(GenericArray::from_slice(nonce), payload)
        .map_err(|_| CryptoError::EncryptFailure)
}

// aes-gcm expects ciphertext || tag, which is exactly the gateway layout.
fn open_with<C: KeyInit + Aead>(
    key: &[u8],
    nonce: &[u8],
    payload: Payload<'_, '_>,
) -> Result<Vec<u8>, CryptoError> {
    cipher_for::<C>(key)?
        .decrypt(GenericArray::from_slice(nonce), payload)
        .map_err(|_| CryptoError::TagMismatch)
}

fn open(
    key: &[u8; KEY_LENGTH],
    sealed: &[u8],
    nonce: &[u8],
    associated_data: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    if sealed.len() < TAG_LENGTH {
        return Err(CryptoError::CiphertextTooShort);
    }
    let payload = Payload {
        msg: sealed,
        aad: associated_data,
    };
    match nonce.len() {
        12 => open_with::<Aes256Gcm12>(key, nonce, payload),
        16 => open_with::<Aes256Gcm16>(key, nonce, payload),
        actual => Err(CryptoError::InvalidNonceLength { actual }),
    }
}
