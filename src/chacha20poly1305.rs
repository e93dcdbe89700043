use crate::buffer::Stash;
use crate::chacha20::{check_key, check_nonce, new_core, ChaChaCore, KEY_SIZE, NONCE_SIZE};
use crate::error::{CipherError, Result};
use crate::poly1305::{new_poly1305, Poly1305};
use crate::{Direction, SeedRng, StreamAead};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

pub const TAG_SIZE: usize = 16;

// RFC 8439 AEAD session. Encryption releases ciphertext as it goes and
// appends the tag at finalize; decryption buffers every ciphertext byte
// and releases nothing until the trailing tag verifies, so its memory is
// proportional to the message. A finalized encrypt session is spent until
// the next init with a fresh (key, nonce); a finalized decrypt session
// restarts itself with the same parameters.
pub struct ChaCha20Poly1305 {
    key: Option<Zeroizing<[u8; KEY_SIZE]>>,
    nonce: [u8; NONCE_SIZE],
    last_enc: Option<(Zeroizing<[u8; KEY_SIZE]>, [u8; NONCE_SIZE])>,
    engine: Option<Engine>,
}

enum Engine {
    Encrypt(EncryptEngine),
    Decrypt(DecryptEngine),
}

// ----------------------------------------------------------------------------
pub fn new_chacha20poly1305() -> ChaCha20Poly1305 {
    ChaCha20Poly1305 {
        key: None,
        nonce: [0; NONCE_SIZE],
        last_enc: None,
        engine: None,
    }
}

// ----------------------------------------------------------------------------
fn pad16(mac: &mut Poly1305, len: u64) {
    let rem = (len % 16) as usize;
    if rem != 0 {
        mac.update(&[0u8; 16][..16 - rem]);
    }
}

fn add_len(len: u64, extra: usize) -> Result<u64> {
    len.checked_add(extra as u64)
        .ok_or(CipherError::IllegalState("length overflow"))
}

// ----------------------------------------------------------------------------
struct EncryptEngine {
    core: ChaChaCore,
    mac: Poly1305,
    aad_len: u64,
    data_len: u64,
    aad_closed: bool,
}

impl EncryptEngine {
    fn new(key: &[u8; KEY_SIZE], nonce: &[u8; NONCE_SIZE]) -> EncryptEngine {
        // data keystream starts at block 1, block 0 keys the authenticator
        let core = new_core(key, nonce, 1);
        let mac = new_poly1305(&core.one_time_key());
        EncryptEngine { core, mac, aad_len: 0, data_len: 0, aad_closed: false }
    }

    fn update_aad(&mut self, aad: &[u8]) -> Result<()> {
        if self.aad_closed {
            return Err(CipherError::IllegalState("associated data must precede message data"));
        }
        self.aad_len = add_len(self.aad_len, aad.len())?;
        self.mac.update(aad);
        Ok(())
    }

    fn close_aad(&mut self) {
        if !self.aad_closed {
            pad16(&mut self.mac, self.aad_len);
            self.aad_closed = true;
        }
    }

    fn update(&mut self, input: &[u8], output: &mut [u8]) -> Result<usize> {
        if output.len() < input.len() {
            return Err(CipherError::BufferTooSmall { needed: input.len() });
        }
        self.data_len = add_len(self.data_len, input.len())?;
        self.close_aad();
        self.core.xor_stream(input, &mut output[..input.len()])?;
        self.mac.update(&output[..input.len()]);
        Ok(input.len())
    }

    fn finalize(mut self, input: &[u8], output: &mut [u8]) -> Result<usize> {
        let written = self.update(input, output)?;
        pad16(&mut self.mac, self.data_len);
        self.mac.update(&self.aad_len.to_le_bytes());
        self.mac.update(&self.data_len.to_le_bytes());
        let tag = self.mac.finalize();
        output[written..written + TAG_SIZE].copy_from_slice(&tag);
        Ok(written + TAG_SIZE)
    }
}

// ----------------------------------------------------------------------------
struct DecryptEngine {
    core: ChaChaCore,
    mac: Poly1305,
    aad_len: u64,
    aad_closed: bool,
    stash: Stash,
}

impl DecryptEngine {
    fn new(key: &[u8; KEY_SIZE], nonce: &[u8; NONCE_SIZE]) -> DecryptEngine {
        let core = new_core(key, nonce, 1);
        let mac = new_poly1305(&core.one_time_key());
        DecryptEngine { core, mac, aad_len: 0, aad_closed: false, stash: Stash::new() }
    }

    fn update_aad(&mut self, aad: &[u8]) -> Result<()> {
        if self.aad_closed {
            return Err(CipherError::IllegalState("associated data must precede message data"));
        }
        self.aad_len = add_len(self.aad_len, aad.len())?;
        self.mac.update(aad);
        Ok(())
    }

    fn close_aad(&mut self) {
        if !self.aad_closed {
            pad16(&mut self.mac, self.aad_len);
            self.aad_closed = true;
        }
    }

    fn update(&mut self, input: &[u8]) -> Result<usize> {
        self.close_aad();
        self.stash.write(input);
        Ok(0)
    }

    fn finalize(mut self, input: &[u8], output: &mut [u8]) -> Result<usize> {
        self.close_aad();
        self.stash.write(input);
        let total = self.stash.len();
        if total < TAG_SIZE {
            // too short to even hold a tag
            return Err(CipherError::AuthenticationFailed);
        }
        let ct_len = total - TAG_SIZE;
        if output.len() < ct_len {
            return Err(CipherError::BufferTooSmall { needed: ct_len });
        }

        let (ciphertext, tag) = self.stash.as_slice().split_at(ct_len);
        self.mac.update(ciphertext);
        pad16(&mut self.mac, ct_len as u64);
        self.mac.update(&self.aad_len.to_le_bytes());
        self.mac.update(&(ct_len as u64).to_le_bytes());
        let expect = self.mac.finalize();
        if !bool::from(expect[..].ct_eq(tag)) {
            return Err(CipherError::AuthenticationFailed);
        }

        self.core.xor_stream(ciphertext, &mut output[..ct_len])?;
        Ok(ct_len)
    }
}

// ----------------------------------------------------------------------------
impl ChaCha20Poly1305 {
    pub fn init(&mut self, direction: Direction, key: &[u8], nonce: &[u8]) -> Result<()> {
        let key = check_key(key)?;
        let nonce = check_nonce(nonce)?;

        if direction == Direction::Encrypt {
            if let Some((last_key, last_nonce)) = &self.last_enc {
                let same_key = bool::from(last_key[..].ct_eq(&key[..]));
                let same_nonce = bool::from(last_nonce[..].ct_eq(&nonce[..]));
                if same_key && same_nonce {
                    return Err(CipherError::InvalidKey(
                        "matching key and nonce from previous encryption",
                    ));
                }
            }
            self.last_enc = Some((key.clone(), nonce));
        }

        self.engine = Some(match direction {
            Direction::Encrypt => Engine::Encrypt(EncryptEngine::new(&key, &nonce)),
            Direction::Decrypt => Engine::Decrypt(DecryptEngine::new(&key, &nonce)),
        });
        self.key = Some(key);
        self.nonce = nonce;
        Ok(())
    }

    /// Encrypt-side init with a freshly drawn nonce, returned to the caller
    /// for transport alongside the ciphertext.
    pub fn init_random_nonce(&mut self, key: &[u8],
                             rng: &mut dyn SeedRng) -> Result<[u8; NONCE_SIZE]> {
        let mut nonce = [0u8; NONCE_SIZE];
        rng.fill(&mut nonce);
        self.init(Direction::Encrypt, key, &nonce)?;
        Ok(nonce)
    }

    fn not_ready(&self) -> CipherError {
        if self.key.is_some() {
            CipherError::IllegalState("cipher is spent, reinitialize with a fresh nonce")
        } else {
            CipherError::IllegalState("cipher not initialized")
        }
    }
}

// ----------------------------------------------------------------------------
impl StreamAead for ChaCha20Poly1305 {
    fn update_aad(&mut self, aad: &[u8]) -> Result<()> {
        match self.engine.as_mut() {
            Some(Engine::Encrypt(e)) => e.update_aad(aad),
            Some(Engine::Decrypt(e)) => e.update_aad(aad),
            None => Err(self.not_ready()),
        }
    }

    fn update(&mut self, input: &[u8], output: &mut [u8]) -> Result<usize> {
        match self.engine.as_mut() {
            Some(Engine::Encrypt(e)) => e.update(input, output),
            Some(Engine::Decrypt(e)) => e.update(input),
            None => Err(self.not_ready()),
        }
    }

    fn finalize(&mut self, input: &[u8], output: &mut [u8]) -> Result<usize> {
        let needed = self.output_size(input.len(), true);
        if output.len() < needed {
            return Err(CipherError::BufferTooSmall { needed });
        }
        let engine = match self.engine.take() {
            Some(e) => e,
            None => return Err(self.not_ready()),
        };
        match engine {
            Engine::Encrypt(enc) => enc.finalize(input, output),
            Engine::Decrypt(dec) => {
                let res = dec.finalize(input, output);
                // decrypt sessions restart with the same parameters
                if let Some(key) = &self.key {
                    self.engine = Some(Engine::Decrypt(DecryptEngine::new(key, &self.nonce)));
                }
                res
            }
        }
    }

    fn output_size(&self, input_len: usize, is_final: bool) -> usize {
        match &self.engine {
            Some(Engine::Encrypt(_)) => {
                if is_final { input_len + TAG_SIZE } else { input_len }
            }
            Some(Engine::Decrypt(d)) => {
                if is_final {
                    (d.stash.len() + input_len).saturating_sub(TAG_SIZE)
                } else {
                    0
                }
            }
            None => 0,
        }
    }
}
