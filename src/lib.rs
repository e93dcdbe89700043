//! Incremental authenticated encryption with ChaCha20-Poly1305 and AES-GCM.
//!
//! Sessions are driven through [`StreamAead`]: feed associated data first,
//! then message data in chunks of any size, then finalize. Encryption emits
//! ciphertext as it goes and appends the tag on the final call; decryption
//! withholds all plaintext until the trailing tag verifies.

pub use crate::error::{CipherError, Result};

/// Which way a session transforms data. Chosen at init and fixed until the
/// next init.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Encrypt,
    Decrypt,
}

pub trait StreamAead {
    /// Feed associated data. Only legal before any message data.
    fn update_aad(&mut self, aad: &[u8]) -> Result<()>;
    /// Feed message data, writing whatever output is ready. Returns the
    /// number of bytes written.
    fn update(&mut self, input: &[u8], output: &mut [u8]) -> Result<usize>;
    /// Feed the last of the data and close the message. Encryption appends
    /// the tag; decryption verifies it and releases the plaintext.
    fn finalize(&mut self, input: &[u8], output: &mut [u8]) -> Result<usize>;
    /// Output bytes the next update (or finalize) of `input_len` bytes can
    /// produce, for sizing buffers.
    fn output_size(&self, input_len: usize, is_final: bool) -> usize;
}

pub trait SeedRng { fn fill(&mut self, buf: &mut [u8]); }

mod aes;
mod buffer;
mod error;
mod ghash;
mod poly1305;

pub mod chacha20;
pub mod chacha20poly1305;
pub mod gcm;
pub mod rng;

pub use crate::chacha20::{new_chacha20, ChaCha20};
pub use crate::chacha20poly1305::{new_chacha20poly1305, ChaCha20Poly1305};
pub use crate::gcm::{new_aesgcm, AesGcm};
pub use crate::rng::OsRng;
