use crate::error::{CipherError, Result};
use zeroize::{Zeroize, ZeroizeOnDrop};

pub(crate) const BLOCK_SIZE: usize = 16;

// ----------------------------------------------------------------------------
// GF(2^8) arithmetic with the AES polynomial x^8+x^4+x^3+x+1; the S-box and
// MixColumns tables are derived from it at compile time.
// ----------------------------------------------------------------------------
const fn gf_mul(mut a: u8, mut b: u8) -> u8 {
    let mut p: u8 = 0;
    let mut i = 0u8;
    while i < 8 {
        if b & 1 != 0 {
            p ^= a;
        }
        let hi = a & 0x80;
        a <<= 1;
        if hi != 0 {
            a ^= 0x1b;
        }
        b >>= 1;
        i += 1;
    }
    p
}

// a^254 = a^-1 via square-and-multiply
const fn gf_inv(a: u8) -> u8 {
    if a == 0 {
        return 0;
    }
    let a2 = gf_mul(a, a);
    let a4 = gf_mul(a2, a2);
    let a8 = gf_mul(a4, a4);
    let a16 = gf_mul(a8, a8);
    let a32 = gf_mul(a16, a16);
    let a64 = gf_mul(a32, a32);
    let a128 = gf_mul(a64, a64);
    let t = gf_mul(a128, a64);
    let t = gf_mul(t, a32);
    let t = gf_mul(t, a16);
    let t = gf_mul(t, a8);
    let t = gf_mul(t, a4);
    gf_mul(t, a2)
}

const fn affine(x: u8) -> u8 {
    x ^ x.rotate_left(1) ^ x.rotate_left(2) ^ x.rotate_left(3) ^ x.rotate_left(4) ^ 0x63
}

const fn make_sbox() -> [u8; 256] {
    let mut s = [0u8; 256];
    let mut i = 0usize;
    while i < 256 {
        s[i] = affine(gf_inv(i as u8));
        i += 1;
    }
    s
}

const SBOX: [u8; 256] = make_sbox();

const fn make_rcon() -> [u32; 15] {
    let mut rcon = [0u32; 15];
    let mut x: u8 = 1;
    let mut i = 0;
    while i < 15 {
        rcon[i] = (x as u32) << 24;
        x = gf_mul(x, 2);
        i += 1;
    }
    rcon
}

const RCON: [u32; 15] = make_rcon();

const fn make_mul(factor: u8) -> [u8; 256] {
    let mut t = [0u8; 256];
    let mut i = 0usize;
    while i < 256 {
        t[i] = gf_mul(i as u8, factor);
        i += 1;
    }
    t
}

const MUL2: [u8; 256] = make_mul(2);
const MUL3: [u8; 256] = make_mul(3);

// ----------------------------------------------------------------------------
#[inline(always)]
fn sub_word(w: u32) -> u32 {
    let b = w.to_be_bytes();
    u32::from_be_bytes([
        SBOX[b[0] as usize],
        SBOX[b[1] as usize],
        SBOX[b[2] as usize],
        SBOX[b[3] as usize],
    ])
}

// ----------------------------------------------------------------------------
// Expanded key schedule for 128, 192 or 256 bit keys. Only the forward
// transform exists; every mode here (CTR keystream, J0 masking, GHASH
// subkey) encrypts.
#[derive(Zeroize, ZeroizeOnDrop)]
pub(crate) struct Aes {
    round_keys: [[u32; 4]; 15], // tail unused below 256-bit keys
    rounds: usize,
}

// ----------------------------------------------------------------------------
pub(crate) fn new_aes(key: &[u8]) -> Result<Aes> {
    let nk = match key.len() {
        16 => 4,
        24 => 6,
        32 => 8,
        _ => return Err(CipherError::InvalidKey("AES key must be 16, 24 or 32 bytes")),
    };
    let rounds = nk + 6;
    let nw = 4 * (rounds + 1);

    let mut w = [0u32; 60];
    for (word, chunk) in w[..nk].iter_mut().zip(key.chunks_exact(4)) {
        *word = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    for i in nk..nw {
        let mut temp = w[i - 1];
        if i % nk == 0 {
            temp = sub_word(temp.rotate_left(8)) ^ RCON[i / nk - 1];
        } else if nk > 6 && i % nk == 4 {
            temp = sub_word(temp);
        }
        w[i] = w[i - nk] ^ temp;
    }

    let mut round_keys = [[0u32; 4]; 15];
    for (rk, words) in round_keys.iter_mut().zip(w.chunks_exact(4)) {
        rk.copy_from_slice(words);
    }
    w.zeroize();

    Ok(Aes { round_keys, rounds })
}

// ----------------------------------------------------------------------------
// State is the flat column-major 4x4 byte matrix, s[row + 4*col].
#[inline(always)]
fn sub_bytes(s: &mut [u8; 16]) {
    for b in s.iter_mut() {
        *b = SBOX[*b as usize];
    }
}

#[inline(always)]
fn shift_rows(s: &mut [u8; 16]) {
    // row 1 left by 1
    let t = s[1];
    s[1] = s[5];
    s[5] = s[9];
    s[9] = s[13];
    s[13] = t;
    // row 2 left by 2
    s.swap(2, 10);
    s.swap(6, 14);
    // row 3 left by 3
    let t = s[15];
    s[15] = s[11];
    s[11] = s[7];
    s[7] = s[3];
    s[3] = t;
}

#[inline(always)]
fn mix_columns(s: &mut [u8; 16]) {
    for col in 0..4 {
        let s0 = s[4 * col];
        let s1 = s[4 * col + 1];
        let s2 = s[4 * col + 2];
        let s3 = s[4 * col + 3];
        s[4 * col] = MUL2[s0 as usize] ^ MUL3[s1 as usize] ^ s2 ^ s3;
        s[4 * col + 1] = s0 ^ MUL2[s1 as usize] ^ MUL3[s2 as usize] ^ s3;
        s[4 * col + 2] = s0 ^ s1 ^ MUL2[s2 as usize] ^ MUL3[s3 as usize];
        s[4 * col + 3] = MUL3[s0 as usize] ^ s1 ^ s2 ^ MUL2[s3 as usize];
    }
}

#[inline(always)]
fn add_round_key(s: &mut [u8; 16], rk: &[u32; 4]) {
    for (col, word) in rk.iter().enumerate() {
        let k = word.to_be_bytes();
        for row in 0..4 {
            s[row + 4 * col] ^= k[row];
        }
    }
}

// ----------------------------------------------------------------------------
impl Aes {
    pub fn encrypt_block(&self, block: &[u8; BLOCK_SIZE]) -> [u8; BLOCK_SIZE] {
        let mut s = *block;
        add_round_key(&mut s, &self.round_keys[0]);
        for r in 1..self.rounds {
            sub_bytes(&mut s);
            shift_rows(&mut s);
            mix_columns(&mut s);
            add_round_key(&mut s, &self.round_keys[r]);
        }
        sub_bytes(&mut s);
        shift_rows(&mut s);
        add_round_key(&mut s, &self.round_keys[self.rounds]);
        s
    }
}

// ----------------------------------------------------------------------------
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sbox_spot_checks() {
        assert_eq!(SBOX[0x00], 0x63);
        assert_eq!(SBOX[0x01], 0x7c);
        assert_eq!(SBOX[0x53], 0xed);
        assert_eq!(SBOX[0xff], 0x16);
    }

    // FIPS 197 appendix C
    #[test]
    fn fips197_known_answers() {
        let pt: [u8; 16] = hex::decode("00112233445566778899aabbccddeeff")
            .unwrap().try_into().unwrap();

        let k128: Vec<u8> = (0u8..16).collect();
        let aes = new_aes(&k128).unwrap();
        assert_eq!(
            aes.encrypt_block(&pt).to_vec(),
            hex::decode("69c4e0d86a7b0430d8cdb78070b4c55a").unwrap()
        );

        let k192: Vec<u8> = (0u8..24).collect();
        let aes = new_aes(&k192).unwrap();
        assert_eq!(
            aes.encrypt_block(&pt).to_vec(),
            hex::decode("dda97ca4864cdfe06eaf70a0ec0d7191").unwrap()
        );

        let k256: Vec<u8> = (0u8..32).collect();
        let aes = new_aes(&k256).unwrap();
        assert_eq!(
            aes.encrypt_block(&pt).to_vec(),
            hex::decode("8ea2b7ca516745bfeafc49904b496089").unwrap()
        );
    }

    #[test]
    fn bad_key_length() {
        assert!(matches!(new_aes(&[0u8; 20]), Err(CipherError::InvalidKey(_))));
    }
}
