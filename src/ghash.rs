// GHASH over GF(2^128) with the GCM polynomial x^128 + x^7 + x^2 + x + 1,
// bits reflected the way SP 800-38D defines them. Used for the auth tag and
// for deriving J0 from IVs that are not 12 bytes.

fn gf_mul(x: u128, y: u128) -> u128 {
    let mut z = 0u128;
    let mut v = x;
    for i in 0..128 {
        if (y >> (127 - i)) & 1 == 1 {
            z ^= v;
        }
        let carry = v & 1;
        v >>= 1;
        if carry != 0 {
            v ^= 0xe1u128 << 120;
        }
    }
    z
}

// ----------------------------------------------------------------------------
pub(crate) struct Ghash {
    h: u128,
    y: u128,
    block: [u8; 16],
    block_len: usize,
}

// ----------------------------------------------------------------------------
pub(crate) fn new_ghash(subkey: &[u8; 16]) -> Ghash {
    Ghash {
        h: u128::from_be_bytes(*subkey),
        y: 0,
        block: [0; 16],
        block_len: 0,
    }
}

// ----------------------------------------------------------------------------
impl Ghash {
    fn absorb(&mut self, block: &[u8; 16]) {
        self.y = gf_mul(self.y ^ u128::from_be_bytes(*block), self.h);
    }

    pub fn update(&mut self, mut data: &[u8]) {
        if self.block_len > 0 {
            let need = 16 - self.block_len;
            let take = need.min(data.len());
            self.block[self.block_len..self.block_len + take].copy_from_slice(&data[..take]);
            self.block_len += take;
            data = &data[take..];
            if self.block_len < 16 {
                return;
            }
            let block = self.block;
            self.absorb(&block);
            self.block_len = 0;
        }
        let mut chunks = data.chunks_exact(16);
        for chunk in &mut chunks {
            let block: [u8; 16] = chunk.try_into().unwrap();
            self.absorb(&block);
        }
        let rest = chunks.remainder();
        self.block[..rest.len()].copy_from_slice(rest);
        self.block_len = rest.len();
    }

    // Close the current partial block with zero padding, as GCM requires
    // after the associated data and after the ciphertext.
    pub fn pad_to_block(&mut self) {
        if self.block_len > 0 {
            let mut block = [0u8; 16];
            block[..self.block_len].copy_from_slice(&self.block[..self.block_len]);
            self.absorb(&block);
            self.block_len = 0;
        }
    }

    pub fn digest(mut self) -> [u8; 16] {
        self.pad_to_block();
        self.y.to_be_bytes()
    }
}

// ----------------------------------------------------------------------------
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_split_is_equivalent() {
        let subkey = [0xc6u8; 16];
        let msg = [0x17u8; 96];

        let mut whole = new_ghash(&subkey);
        whole.update(&msg);
        let expect = whole.digest();

        let mut split = new_ghash(&subkey);
        for chunk in msg.chunks(5) {
            split.update(chunk);
        }
        assert_eq!(split.digest(), expect);
    }

    #[test]
    fn mul_identity() {
        // 1 in this bit order is the top bit
        let one = 1u128 << 127;
        let x = 0x0123_4567_89ab_cdef_0123_4567_89ab_cdefu128;
        assert_eq!(gf_mul(x, one), x);
        assert_eq!(gf_mul(one, x), x);
    }
}
