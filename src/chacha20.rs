use crate::error::{CipherError, Result};
use crate::StreamAead;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

type State = [u32; 16];

pub const KEY_SIZE: usize = 32;
pub const NONCE_SIZE: usize = 12;
pub(crate) const BLOCK_SIZE: usize = 64;

// "expand 32-byte k"
const CONSTANTS: [u32; 4] = [0x61707865, 0x3320646e, 0x79622d32, 0x6b206574];

// ----------------------------------------------------------------------------
#[inline(always)]
fn quarter_round(a: usize, b: usize, c: usize, d: usize, state: &mut State) {
    state[a] = state[a].wrapping_add(state[b]);
    state[d] = (state[d] ^ state[a]).rotate_left(16);

    state[c] = state[c].wrapping_add(state[d]);
    state[b] = (state[b] ^ state[c]).rotate_left(12);

    state[a] = state[a].wrapping_add(state[b]);
    state[d] = (state[d] ^ state[a]).rotate_left(8);

    state[c] = state[c].wrapping_add(state[d]);
    state[b] = (state[b] ^ state[c]).rotate_left(7);
}

// ----------------------------------------------------------------------------
fn run_rounds(state: &State) -> State {
    let mut res = *state;

    for _ in 0..10 {
        // column rounds
        quarter_round(0, 4, 8, 12, &mut res);
        quarter_round(1, 5, 9, 13, &mut res);
        quarter_round(2, 6, 10, 14, &mut res);
        quarter_round(3, 7, 11, 15, &mut res);

        // diagonal rounds
        quarter_round(0, 5, 10, 15, &mut res);
        quarter_round(1, 6, 11, 12, &mut res);
        quarter_round(2, 7, 8, 13, &mut res);
        quarter_round(3, 4, 9, 14, &mut res);
    }

    for (s1, s0) in res.iter_mut().zip(state.iter()) {
        *s1 = s1.wrapping_add(*s0);
    }

    res
}

// ----------------------------------------------------------------------------
fn state_to_u8(state: &State, dst: &mut [u8; BLOCK_SIZE]) {
    for (chunk, val) in dst.chunks_exact_mut(4).zip(state.iter()) {
        chunk.copy_from_slice(&val.to_le_bytes());
    }
}

// ----------------------------------------------------------------------------
// Start state plus a running block counter and a 64-byte keystream window,
// so callers can xor in chunks of any size. The counter is widened to u64
// purely to detect exhaustion: a single (key, nonce) pair may produce at
// most 2^32 blocks starting from the initial counter.
#[derive(Zeroize, ZeroizeOnDrop)]
pub(crate) struct ChaChaCore {
    state: State, // word 12 is filled in per block
    counter: u64,
    pub(crate) final_counter: u64,
    ks: [u8; BLOCK_SIZE],
    ks_index: usize,
}

// ----------------------------------------------------------------------------
pub(crate) fn new_core(key: &[u8; KEY_SIZE], nonce: &[u8; NONCE_SIZE],
                       initial_counter: u32) -> ChaChaCore {
    let mut state: State = [0; 16];
    state[..4].copy_from_slice(&CONSTANTS);
    for (w, chunk) in state[4..12].iter_mut().zip(key.chunks_exact(4)) {
        *w = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    for (w, chunk) in state[13..16].iter_mut().zip(nonce.chunks_exact(4)) {
        *w = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    ChaChaCore {
        state,
        counter: initial_counter as u64,
        final_counter: initial_counter as u64 + 0xFFFF_FFFF,
        ks: [0; BLOCK_SIZE],
        ks_index: BLOCK_SIZE, // window starts empty
    }
}

// ----------------------------------------------------------------------------
impl ChaChaCore {
    pub fn block(&self, counter: u32) -> [u8; BLOCK_SIZE] {
        let mut state = self.state;
        state[12] = counter;
        let mut out = [0u8; BLOCK_SIZE];
        state_to_u8(&run_rounds(&state), &mut out);
        out
    }

    // First half of the keystream block at counter zero acts as a
    // one-time Poly1305 key, the rest is discarded.
    pub fn one_time_key(&self) -> Zeroizing<[u8; 32]> {
        let block = Zeroizing::new(self.block(0));
        let mut key = Zeroizing::new([0u8; 32]);
        key.copy_from_slice(&block[..32]);
        key
    }

    fn refill(&mut self) -> Result<()> {
        if self.counter > self.final_counter {
            return Err(CipherError::CounterExhausted);
        }
        self.ks = self.block(self.counter as u32);
        self.ks_index = 0;
        self.counter += 1;
        Ok(())
    }

    pub fn xor_stream(&mut self, input: &[u8], output: &mut [u8]) -> Result<()> {
        debug_assert!(output.len() >= input.len());
        for (i, o) in input.iter().zip(output.iter_mut()) {
            if self.ks_index == BLOCK_SIZE {
                self.refill()?;
            }
            *o = *i ^ self.ks[self.ks_index];
            self.ks_index += 1;
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Plain ChaCha20 keystream cipher. No authentication and no associated
// data; encryption and decryption are the same xor. The caller picks the
// initial block counter.
pub struct ChaCha20 {
    core: ChaChaCore,
}

// ----------------------------------------------------------------------------
pub fn new_chacha20(key: &[u8], nonce: &[u8], initial_counter: u32) -> Result<ChaCha20> {
    let key = check_key(key)?;
    let nonce = check_nonce(nonce)?;
    Ok(ChaCha20 { core: new_core(&key, &nonce, initial_counter) })
}

pub(crate) fn check_key(key: &[u8]) -> Result<Zeroizing<[u8; KEY_SIZE]>> {
    if key.len() != KEY_SIZE {
        return Err(CipherError::InvalidKey("ChaCha20 key must be 32 bytes"));
    }
    let mut k = Zeroizing::new([0u8; KEY_SIZE]);
    k.copy_from_slice(key);
    Ok(k)
}

pub(crate) fn check_nonce(nonce: &[u8]) -> Result<[u8; NONCE_SIZE]> {
    nonce.try_into()
        .map_err(|_| CipherError::InvalidParameter("ChaCha20 nonce must be 12 bytes"))
}

// ----------------------------------------------------------------------------
impl StreamAead for ChaCha20 {
    fn update_aad(&mut self, _aad: &[u8]) -> Result<()> {
        Err(CipherError::IllegalState("stream cipher takes no associated data"))
    }

    fn update(&mut self, input: &[u8], output: &mut [u8]) -> Result<usize> {
        if output.len() < input.len() {
            return Err(CipherError::BufferTooSmall { needed: input.len() });
        }
        self.core.xor_stream(input, &mut output[..input.len()])?;
        Ok(input.len())
    }

    fn finalize(&mut self, input: &[u8], output: &mut [u8]) -> Result<usize> {
        self.update(input, output)
    }

    fn output_size(&self, input_len: usize, _is_final: bool) -> usize {
        input_len
    }
}

// ----------------------------------------------------------------------------
#[cfg(test)]
mod tests {
    use super::*;

    // RFC 8439 section 2.3.2
    #[test]
    fn block_function_vector() {
        let key: Vec<u8> = (0u8..32).collect();
        let nonce = hex::decode("000000090000004a00000000").unwrap();
        let core = new_core(&key.try_into().unwrap(), &nonce.try_into().unwrap(), 1);
        let expect = hex::decode(
            "10f1e7e4d13b5915500fdd1fa32071c4c7d1f4c733c068030422aa9ac3d46c4e\
             d2826446079faa0914c2d705d98b02a2b5129cd1de164eb9cbd083e8a2503c4e",
        ).unwrap();
        assert_eq!(&core.block(1)[..], &expect[..]);
    }

    // RFC 8439 section 2.4.2
    #[test]
    fn encryption_vector() {
        let key: Vec<u8> = (0u8..32).collect();
        let nonce = hex::decode("000000000000004a00000000").unwrap();
        let plaintext = b"Ladies and Gentlemen of the class of '99: If I could \
offer you only one tip for the future, sunscreen would be it.";
        let mut cipher = new_chacha20(&key, &nonce, 1).unwrap();
        let mut out = vec![0u8; plaintext.len()];
        cipher.update(plaintext, &mut out).unwrap();
        let expect = hex::decode(
            "6e2e359a2568f98041ba0728dd0d6981e97e7aec1d4360c20a27afccfd9fae0b\
             f91b65c5524733ab8f593dabcd62b3571639d624e65152ab8f530c359f0861d8\
             07ca0dbf500d6a6156a38e088a22b65e52bc514d16ccf806818ce91ab7793736\
             5af90bbf74a35be6b40b8eedf2785e42874d",
        ).unwrap();
        assert_eq!(out, expect);
    }

    #[test]
    fn keystream_window_chunking() {
        let key = [7u8; 32];
        let nonce = [3u8; 12];
        let data = [0xabu8; 257];

        let mut whole = new_chacha20(&key, &nonce, 0).unwrap();
        let mut expect = vec![0u8; data.len()];
        whole.update(&data, &mut expect).unwrap();

        let mut split = new_chacha20(&key, &nonce, 0).unwrap();
        let mut got = vec![0u8; data.len()];
        let mut off = 0;
        for chunk in data.chunks(13) {
            off += split.update(chunk, &mut got[off..]).unwrap();
        }
        assert_eq!(got, expect);
    }

    #[test]
    fn counter_exhaustion() {
        let mut cipher = new_chacha20(&[1u8; 32], &[2u8; 12], 0).unwrap();
        // shrink the budget to two blocks
        cipher.core.final_counter = 1;
        let input = [0u8; 128];
        let mut out = [0u8; 128];
        assert!(cipher.update(&input, &mut out).is_ok());
        assert_eq!(
            cipher.update(&[0u8; 1], &mut [0u8; 1]),
            Err(CipherError::CounterExhausted)
        );
    }

    #[test]
    fn short_output_rejected() {
        let mut cipher = new_chacha20(&[1u8; 32], &[2u8; 12], 0).unwrap();
        let mut out = [0u8; 3];
        assert_eq!(
            cipher.update(&[0u8; 4], &mut out),
            Err(CipherError::BufferTooSmall { needed: 4 })
        );
    }
}
