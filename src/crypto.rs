// Wavebond envelope: AES-128-CBC with PKCS7 padding, blob = iv || ciphertext.
//
// The key is derived from the shared secret by truncating or space-padding
// its UTF-8 bytes to exactly 16 bytes; seal and open use the same derivation.
//
// There is no authentication tag. A tampered blob is only detected when the
// padding or the claims layout breaks after decryption. Kept as-is for
// compatibility with already-issued bond files.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;
use thiserror::Error;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

pub const IV_LEN: usize = 16;
pub const KEY_LEN: usize = 16;
const BLOCK_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("malformed envelope")]
    Malformed,
}

#[derive(Clone)]
pub struct Envelope {
    key: [u8; KEY_LEN],
}

impl Envelope {
    pub fn new(secret: &str) -> Envelope {
        let mut key = [b' '; KEY_LEN];
        let bytes = secret.as_bytes();
        let n = bytes.len().min(KEY_LEN);
        key[..n].copy_from_slice(&bytes[..n]);
        Envelope { key }
    }

    pub fn seal(&self, plaintext: &str) -> Vec<u8> {
        let mut iv = [0u8; IV_LEN];
        rand::rng().fill_bytes(&mut iv);

        let ciphertext = Aes128CbcEnc::new(&self.key.into(), &iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

        let mut blob = Vec::with_capacity(IV_LEN + ciphertext.len());
        blob.extend_from_slice(&iv);
        blob.extend_from_slice(&ciphertext);
        blob
    }

    pub fn open(&self, blob: &[u8]) -> Result<String, EnvelopeError> {
        if blob.len() <= IV_LEN || (blob.len() - IV_LEN) % BLOCK_LEN != 0 {
            return Err(EnvelopeError::Malformed);
        }

        let (iv, ciphertext) = blob.split_at(IV_LEN);
        let padded = Aes128CbcDec::new_from_slices(&self.key, iv)
            .map_err(|_| EnvelopeError::Malformed)?
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| EnvelopeError::Malformed)?;

        String::from_utf8(padded).map_err(|_| EnvelopeError::Malformed)
    }
}
