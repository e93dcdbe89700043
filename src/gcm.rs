use crate::aes::{new_aes, Aes, BLOCK_SIZE};
use crate::buffer::Stash;
use crate::error::{CipherError, Result};
use crate::ghash::{new_ghash, Ghash};
use crate::{Direction, SeedRng, StreamAead};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

pub const DEFAULT_IV_SIZE: usize = 12;
pub const DEFAULT_TAG_SIZE: usize = 16;

// SP 800-38D per-message limit: the 32-bit counter field may step through
// at most 2^32 - 2 data blocks before J0 would repeat.
const MAX_BLOCKS: u64 = (1 << 32) - 2;

// ----------------------------------------------------------------------------
fn inc32(block: &mut [u8; BLOCK_SIZE]) {
    let n = u32::from_be_bytes([block[12], block[13], block[14], block[15]]).wrapping_add(1);
    block[12..].copy_from_slice(&n.to_be_bytes());
}

// J0 is the IV itself padded with a one-based counter when the IV is the
// recommended 12 bytes, and a GHASH of the IV otherwise.
fn derive_j0(subkey: &[u8; BLOCK_SIZE], iv: &[u8]) -> [u8; BLOCK_SIZE] {
    if iv.len() == DEFAULT_IV_SIZE {
        let mut j0 = [0u8; BLOCK_SIZE];
        j0[..DEFAULT_IV_SIZE].copy_from_slice(iv);
        j0[15] = 1;
        j0
    } else {
        let mut g = new_ghash(subkey);
        g.update(iv);
        g.pad_to_block();
        g.update(&[0u8; 8]);
        g.update(&(iv.len() as u64).wrapping_mul(8).to_be_bytes());
        g.digest()
    }
}

fn length_block(aad_len: u64, ct_len: u64) -> [u8; BLOCK_SIZE] {
    let mut block = [0u8; BLOCK_SIZE];
    block[..8].copy_from_slice(&aad_len.wrapping_mul(8).to_be_bytes());
    block[8..].copy_from_slice(&ct_len.wrapping_mul(8).to_be_bytes());
    block
}

fn add_len(len: u64, extra: usize) -> Result<u64> {
    len.checked_add(extra as u64)
        .ok_or(CipherError::IllegalState("length overflow"))
}

// ----------------------------------------------------------------------------
// CTR keystream starting one step past J0, with a 16-byte window so callers
// are not held to block boundaries.
struct Gctr {
    counter: [u8; BLOCK_SIZE],
    blocks: u64,
    ks: [u8; BLOCK_SIZE],
    ks_index: usize,
}

fn new_gctr(j0: &[u8; BLOCK_SIZE]) -> Gctr {
    Gctr { counter: *j0, blocks: 0, ks: [0; BLOCK_SIZE], ks_index: BLOCK_SIZE }
}

impl Gctr {
    fn refill(&mut self, aes: &Aes) -> Result<()> {
        if self.blocks == MAX_BLOCKS {
            return Err(CipherError::CounterExhausted);
        }
        inc32(&mut self.counter);
        self.ks = aes.encrypt_block(&self.counter);
        self.ks_index = 0;
        self.blocks += 1;
        Ok(())
    }

    fn xor(&mut self, aes: &Aes, input: &[u8], output: &mut [u8]) -> Result<()> {
        debug_assert!(output.len() >= input.len());
        for (i, o) in input.iter().zip(output.iter_mut()) {
            if self.ks_index == BLOCK_SIZE {
                self.refill(aes)?;
            }
            *o = *i ^ self.ks[self.ks_index];
            self.ks_index += 1;
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
struct GcmEncrypt {
    aes: Aes,
    gctr: Gctr,
    ghash: Ghash,
    j0: [u8; BLOCK_SIZE],
    tag_len: usize,
    aad_len: u64,
    ct_len: u64,
    aad_closed: bool,
    stash: Stash, // sub-block plaintext remainder
}

impl GcmEncrypt {
    fn update_aad(&mut self, aad: &[u8]) -> Result<()> {
        if self.aad_closed {
            return Err(CipherError::IllegalState("associated data must precede message data"));
        }
        self.aad_len = add_len(self.aad_len, aad.len())?;
        self.ghash.update(aad);
        Ok(())
    }

    fn close_aad(&mut self) {
        if !self.aad_closed {
            self.ghash.pad_to_block();
            self.aad_closed = true;
        }
    }

    fn update(&mut self, input: &[u8], output: &mut [u8]) -> Result<usize> {
        let total = self.stash.len() + input.len();
        let out_len = total & !(BLOCK_SIZE - 1);
        if output.len() < out_len {
            return Err(CipherError::BufferTooSmall { needed: out_len });
        }
        self.ct_len = add_len(self.ct_len, input.len())?;
        self.close_aad();

        let mut input = input;
        let mut written = 0;
        if !self.stash.is_empty() && total >= BLOCK_SIZE {
            // top the remainder up to a full block
            let need = BLOCK_SIZE - self.stash.len();
            let mut block = Zeroizing::new([0u8; BLOCK_SIZE]);
            block[..self.stash.len()].copy_from_slice(self.stash.as_slice());
            block[self.stash.len()..].copy_from_slice(&input[..need]);
            self.gctr.xor(&self.aes, &block[..], &mut output[..BLOCK_SIZE])?;
            self.ghash.update(&output[..BLOCK_SIZE]);
            self.stash.reset();
            input = &input[need..];
            written = BLOCK_SIZE;
        }
        if self.stash.is_empty() {
            let whole = input.len() & !(BLOCK_SIZE - 1);
            self.gctr.xor(&self.aes, &input[..whole], &mut output[written..written + whole])?;
            self.ghash.update(&output[written..written + whole]);
            written += whole;
            input = &input[whole..];
        }
        self.stash.write(input);
        Ok(written)
    }

    fn finalize(mut self, input: &[u8], output: &mut [u8]) -> Result<usize> {
        self.ct_len = add_len(self.ct_len, input.len())?;
        self.close_aad();

        let total = self.stash.len() + input.len();
        let needed = total + self.tag_len;
        if output.len() < needed {
            return Err(CipherError::BufferTooSmall { needed });
        }

        let mut plain = Zeroizing::new(Vec::with_capacity(total));
        plain.extend_from_slice(self.stash.as_slice());
        plain.extend_from_slice(input);
        self.gctr.xor(&self.aes, &plain, &mut output[..total])?;
        self.ghash.update(&output[..total]);
        self.ghash.pad_to_block();
        self.ghash.update(&length_block(self.aad_len, self.ct_len));

        let digest = self.ghash.digest();
        let mask = self.aes.encrypt_block(&self.j0);
        for ((o, d), m) in output[total..needed].iter_mut().zip(digest.iter()).zip(mask.iter()) {
            *o = d ^ m;
        }
        Ok(needed)
    }
}

// ----------------------------------------------------------------------------
// Decryption holds every ciphertext byte back until the trailing tag is
// checked, so the tag may arrive split across updates and the final call.
struct GcmDecrypt {
    aes: Aes,
    gctr: Gctr,
    ghash: Ghash,
    j0: [u8; BLOCK_SIZE],
    tag_len: usize,
    aad_len: u64,
    aad_closed: bool,
    stash: Stash, // all of the ciphertext plus tag
}

impl GcmDecrypt {
    fn update_aad(&mut self, aad: &[u8]) -> Result<()> {
        if self.aad_closed {
            return Err(CipherError::IllegalState("associated data must precede message data"));
        }
        self.aad_len = add_len(self.aad_len, aad.len())?;
        self.ghash.update(aad);
        Ok(())
    }

    fn close_aad(&mut self) {
        if !self.aad_closed {
            self.ghash.pad_to_block();
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
        if total < self.tag_len {
            return Err(CipherError::AuthenticationFailed);
        }
        let ct_len = total - self.tag_len;
        if output.len() < ct_len {
            return Err(CipherError::BufferTooSmall { needed: ct_len });
        }

        let (ciphertext, tag) = self.stash.as_slice().split_at(ct_len);
        self.ghash.update(ciphertext);
        self.ghash.pad_to_block();
        self.ghash.update(&length_block(self.aad_len, ct_len as u64));
        let digest = self.ghash.digest();
        let mask = self.aes.encrypt_block(&self.j0);
        let mut expect = [0u8; BLOCK_SIZE];
        for ((e, d), m) in expect.iter_mut().zip(digest.iter()).zip(mask.iter()) {
            *e = d ^ m;
        }
        if !bool::from(expect[..self.tag_len].ct_eq(tag)) {
            return Err(CipherError::AuthenticationFailed);
        }

        self.gctr.xor(&self.aes, ciphertext, &mut output[..ct_len])?;
        Ok(ct_len)
    }
}

// ----------------------------------------------------------------------------
enum GcmEngine {
    Encrypt(GcmEncrypt),
    Decrypt(GcmDecrypt),
}

fn build_engine(key: &[u8], iv: &[u8], tag_len: usize,
                direction: Direction) -> Result<GcmEngine> {
    let aes = new_aes(key)?;
    let subkey = aes.encrypt_block(&[0u8; BLOCK_SIZE]);
    let j0 = derive_j0(&subkey, iv);
    let gctr = new_gctr(&j0);
    let ghash = new_ghash(&subkey);
    Ok(match direction {
        Direction::Encrypt => GcmEngine::Encrypt(GcmEncrypt {
            aes, gctr, ghash, j0, tag_len,
            aad_len: 0, ct_len: 0, aad_closed: false,
            stash: Stash::with_capacity(BLOCK_SIZE),
        }),
        Direction::Decrypt => GcmEngine::Decrypt(GcmDecrypt {
            aes, gctr, ghash, j0, tag_len,
            aad_len: 0, aad_closed: false,
            stash: Stash::new(),
        }),
    })
}

// ----------------------------------------------------------------------------
// AES-GCM session. Same lifecycle as the ChaCha20-Poly1305 session: a
// finalized encrypt side is spent until re-init, a finalized decrypt side
// restarts itself, and a (key, IV) pair that already encrypted a message
// is refused.
pub struct AesGcm {
    key: Option<Zeroizing<Vec<u8>>>,
    iv: Vec<u8>,
    tag_len: usize,
    last_enc: Option<(Zeroizing<Vec<u8>>, Vec<u8>)>,
    engine: Option<GcmEngine>,
}

// ----------------------------------------------------------------------------
pub fn new_aesgcm() -> AesGcm {
    AesGcm {
        key: None,
        iv: Vec::new(),
        tag_len: DEFAULT_TAG_SIZE,
        last_enc: None,
        engine: None,
    }
}

// ----------------------------------------------------------------------------
impl AesGcm {
    pub fn init(&mut self, direction: Direction, key: &[u8], iv: &[u8],
                tag_bits: usize) -> Result<()> {
        if tag_bits < 96 || tag_bits > 128 || tag_bits % 8 != 0 {
            return Err(CipherError::InvalidParameter(
                "tag length must be 96 to 128 bits in multiples of 8",
            ));
        }
        if iv.is_empty() {
            return Err(CipherError::InvalidParameter("IV must not be empty"));
        }
        let tag_len = tag_bits / 8;

        if direction == Direction::Encrypt {
            if let Some((last_key, last_iv)) = &self.last_enc {
                let same_key = bool::from(last_key[..].ct_eq(key));
                let same_iv = bool::from(last_iv[..].ct_eq(iv));
                if same_key && same_iv {
                    return Err(CipherError::InvalidParameter(
                        "cannot reuse an IV for GCM encryption",
                    ));
                }
            }
        }

        self.engine = Some(build_engine(key, iv, tag_len, direction)?);
        if direction == Direction::Encrypt {
            self.last_enc = Some((Zeroizing::new(key.to_vec()), iv.to_vec()));
        }
        self.key = Some(Zeroizing::new(key.to_vec()));
        self.iv = iv.to_vec();
        self.tag_len = tag_len;
        Ok(())
    }

    /// Encrypt-side init with a freshly drawn 12-byte IV and the full tag.
    pub fn init_random_iv(&mut self, key: &[u8],
                          rng: &mut dyn SeedRng) -> Result<[u8; DEFAULT_IV_SIZE]> {
        let mut iv = [0u8; DEFAULT_IV_SIZE];
        rng.fill(&mut iv);
        self.init(Direction::Encrypt, key, &iv, DEFAULT_TAG_SIZE * 8)?;
        Ok(iv)
    }

    fn not_ready(&self) -> CipherError {
        if self.key.is_some() {
            CipherError::IllegalState("cipher is spent, reinitialize with a fresh IV")
        } else {
            CipherError::IllegalState("cipher not initialized")
        }
    }
}

// ----------------------------------------------------------------------------
impl StreamAead for AesGcm {
    fn update_aad(&mut self, aad: &[u8]) -> Result<()> {
        match self.engine.as_mut() {
            Some(GcmEngine::Encrypt(e)) => e.update_aad(aad),
            Some(GcmEngine::Decrypt(e)) => e.update_aad(aad),
            None => Err(self.not_ready()),
        }
    }

    fn update(&mut self, input: &[u8], output: &mut [u8]) -> Result<usize> {
        match self.engine.as_mut() {
            Some(GcmEngine::Encrypt(e)) => e.update(input, output),
            Some(GcmEngine::Decrypt(e)) => e.update(input),
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
            GcmEngine::Encrypt(enc) => enc.finalize(input, output),
            GcmEngine::Decrypt(dec) => {
                let res = dec.finalize(input, output);
                // decrypt sessions restart with the same parameters
                if let Some(key) = &self.key {
                    self.engine = Some(build_engine(key, &self.iv, self.tag_len,
                                                    Direction::Decrypt)?);
                }
                res
            }
        }
    }

    fn output_size(&self, input_len: usize, is_final: bool) -> usize {
        match &self.engine {
            Some(GcmEngine::Encrypt(e)) => {
                let total = e.stash.len() + input_len;
                if is_final { total + e.tag_len } else { total & !(BLOCK_SIZE - 1) }
            }
            Some(GcmEngine::Decrypt(d)) => {
                if is_final {
                    (d.stash.len() + input_len).saturating_sub(d.tag_len)
                } else {
                    0
                }
            }
            None => 0,
        }
    }
}

// ----------------------------------------------------------------------------
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inc32_wraps_only_the_counter_field() {
        let mut block = [0xffu8; 16];
        inc32(&mut block);
        assert_eq!(&block[..12], &[0xff; 12]);
        assert_eq!(&block[12..], &[0, 0, 0, 0]);
    }

    #[test]
    fn counter_budget_exhaustion() {
        let mut gcm = new_aesgcm();
        gcm.init(Direction::Encrypt, &[0u8; 16], &[1u8; 12], 128).unwrap();
        if let Some(GcmEngine::Encrypt(e)) = gcm.engine.as_mut() {
            e.gctr.blocks = MAX_BLOCKS;
        } else {
            panic!("expected encrypt engine");
        }
        let mut out = [0u8; 16];
        assert_eq!(
            gcm.update(&[0u8; 16], &mut out),
            Err(CipherError::CounterExhausted)
        );
    }

    #[test]
    fn tag_length_bounds() {
        let mut gcm = new_aesgcm();
        for bits in [0usize, 64, 95, 100, 136] {
            assert!(matches!(
                gcm.init(Direction::Encrypt, &[0u8; 16], &[1u8; 12], bits),
                Err(CipherError::InvalidParameter(_))
            ));
        }
        for bits in [96usize, 104, 112, 120, 128] {
            let iv = [bits as u8; 12]; // distinct IVs, reuse is refused
            gcm.init(Direction::Encrypt, &[0u8; 16], &iv, bits).unwrap();
        }
    }
}
