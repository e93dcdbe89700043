use zeroize::{Zeroize, ZeroizeOnDrop};

// One-time authenticator over GF(2^130 - 5). The 32-byte key splits into
// the clamped multiplier r and the final addend s; accumulation runs in
// five 26-bit limbs so products fit in u64.
#[derive(Zeroize, ZeroizeOnDrop)]
pub(crate) struct Poly1305 {
    r: [u32; 5],
    h: [u32; 5],
    s: [u8; 16],
    block: [u8; 16],
    block_len: usize,
}

const LIMB_MASK: u32 = 0x3ff_ffff;

#[inline(always)]
fn le32(b: &[u8]) -> u32 {
    u32::from_le_bytes([b[0], b[1], b[2], b[3]])
}

// ----------------------------------------------------------------------------
pub(crate) fn new_poly1305(key: &[u8; 32]) -> Poly1305 {
    let mut mac = Poly1305 {
        r: [0; 5],
        h: [0; 5],
        s: [0; 16],
        block: [0; 16],
        block_len: 0,
    };
    // clamp: r &= 0x0ffffffc_0ffffffc_0ffffffc_0fffffff
    mac.r[0] = le32(&key[0..4]) & 0x3ff_ffff;
    mac.r[1] = (le32(&key[3..7]) >> 2) & 0x3ff_ff03;
    mac.r[2] = (le32(&key[6..10]) >> 4) & 0x3ff_c0ff;
    mac.r[3] = (le32(&key[9..13]) >> 6) & 0x3f0_3fff;
    mac.r[4] = (le32(&key[12..16]) >> 8) & 0x00f_ffff;
    mac.s.copy_from_slice(&key[16..32]);
    mac
}

// ----------------------------------------------------------------------------
impl Poly1305 {
    fn process_block(&mut self, block: &[u8; 16], hibit: u32) {
        let h0 = (self.h[0] + (le32(&block[0..4]) & LIMB_MASK)) as u64;
        let h1 = (self.h[1] + ((le32(&block[3..7]) >> 2) & LIMB_MASK)) as u64;
        let h2 = (self.h[2] + ((le32(&block[6..10]) >> 4) & LIMB_MASK)) as u64;
        let h3 = (self.h[3] + ((le32(&block[9..13]) >> 6) & LIMB_MASK)) as u64;
        let h4 = (self.h[4] + ((le32(&block[12..16]) >> 8) | hibit)) as u64;

        let r0 = self.r[0] as u64;
        let r1 = self.r[1] as u64;
        let r2 = self.r[2] as u64;
        let r3 = self.r[3] as u64;
        let r4 = self.r[4] as u64;
        let s1 = r1 * 5;
        let s2 = r2 * 5;
        let s3 = r3 * 5;
        let s4 = r4 * 5;

        let d0 = h0 * r0 + h1 * s4 + h2 * s3 + h3 * s2 + h4 * s1;
        let mut d1 = h0 * r1 + h1 * r0 + h2 * s4 + h3 * s3 + h4 * s2;
        let mut d2 = h0 * r2 + h1 * r1 + h2 * r0 + h3 * s4 + h4 * s3;
        let mut d3 = h0 * r3 + h1 * r2 + h2 * r1 + h3 * r0 + h4 * s4;
        let mut d4 = h0 * r4 + h1 * r3 + h2 * r2 + h3 * r1 + h4 * r0;

        let mut c = d0 >> 26;
        self.h[0] = d0 as u32 & LIMB_MASK;
        d1 += c;
        c = d1 >> 26;
        self.h[1] = d1 as u32 & LIMB_MASK;
        d2 += c;
        c = d2 >> 26;
        self.h[2] = d2 as u32 & LIMB_MASK;
        d3 += c;
        c = d3 >> 26;
        self.h[3] = d3 as u32 & LIMB_MASK;
        d4 += c;
        c = d4 >> 26;
        self.h[4] = d4 as u32 & LIMB_MASK;
        self.h[0] += (c as u32) * 5;
        let c = self.h[0] >> 26;
        self.h[0] &= LIMB_MASK;
        self.h[1] += c;
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
            self.process_block(&block, 1 << 24);
            self.block_len = 0;
        }
        let mut chunks = data.chunks_exact(16);
        for chunk in &mut chunks {
            let block: [u8; 16] = chunk.try_into().unwrap();
            self.process_block(&block, 1 << 24);
        }
        let rest = chunks.remainder();
        self.block[..rest.len()].copy_from_slice(rest);
        self.block_len = rest.len();
    }

    pub fn finalize(mut self) -> [u8; 16] {
        if self.block_len > 0 {
            // pad the trailing partial block with the 1 bit then zeros
            let mut block = [0u8; 16];
            block[..self.block_len].copy_from_slice(&self.block[..self.block_len]);
            block[self.block_len] = 1;
            self.process_block(&block, 0);
            block.zeroize();
        }

        let mut c = self.h[1] >> 26;
        self.h[1] &= LIMB_MASK;
        self.h[2] += c;
        c = self.h[2] >> 26;
        self.h[2] &= LIMB_MASK;
        self.h[3] += c;
        c = self.h[3] >> 26;
        self.h[3] &= LIMB_MASK;
        self.h[4] += c;
        c = self.h[4] >> 26;
        self.h[4] &= LIMB_MASK;
        self.h[0] += c * 5;
        c = self.h[0] >> 26;
        self.h[0] &= LIMB_MASK;
        self.h[1] += c;

        // compute h + 5 - 2^130 and keep it when it did not go negative
        let mut g0 = self.h[0].wrapping_add(5);
        c = g0 >> 26;
        g0 &= LIMB_MASK;
        let mut g1 = self.h[1].wrapping_add(c);
        c = g1 >> 26;
        g1 &= LIMB_MASK;
        let mut g2 = self.h[2].wrapping_add(c);
        c = g2 >> 26;
        g2 &= LIMB_MASK;
        let mut g3 = self.h[3].wrapping_add(c);
        c = g3 >> 26;
        g3 &= LIMB_MASK;
        let g4 = self.h[4].wrapping_add(c).wrapping_sub(1 << 26);

        let keep = (g4 >> 31).wrapping_sub(1);
        let h0 = (self.h[0] & !keep) | (g0 & keep);
        let h1 = (self.h[1] & !keep) | (g1 & keep);
        let h2 = (self.h[2] & !keep) | (g2 & keep);
        let h3 = (self.h[3] & !keep) | (g3 & keep);
        let h4 = (self.h[4] & !keep) | (g4 & keep);

        // repack to four little-endian words and add s
        let w0 = h0 | (h1 << 26);
        let w1 = (h1 >> 6) | (h2 << 20);
        let w2 = (h2 >> 12) | (h3 << 14);
        let w3 = (h3 >> 18) | (h4 << 8);

        let mut tag = [0u8; 16];
        let mut f = w0 as u64 + le32(&self.s[0..4]) as u64;
        tag[0..4].copy_from_slice(&(f as u32).to_le_bytes());
        f = w1 as u64 + le32(&self.s[4..8]) as u64 + (f >> 32);
        tag[4..8].copy_from_slice(&(f as u32).to_le_bytes());
        f = w2 as u64 + le32(&self.s[8..12]) as u64 + (f >> 32);
        tag[8..12].copy_from_slice(&(f as u32).to_le_bytes());
        f = w3 as u64 + le32(&self.s[12..16]) as u64 + (f >> 32);
        tag[12..16].copy_from_slice(&(f as u32).to_le_bytes());
        tag
    }
}

// ----------------------------------------------------------------------------
#[cfg(test)]
mod tests {
    use super::*;

    // RFC 8439 section 2.5.2
    #[test]
    fn tag_vector() {
        let key = hex::decode(
            "85d6be7857556d337f4452fe42d506a80103808afb0db2fd4abff6af4149f51b",
        ).unwrap();
        let mut mac = new_poly1305(&key.try_into().unwrap());
        mac.update(b"Cryptographic Forum Research Group");
        assert_eq!(
            mac.finalize().to_vec(),
            hex::decode("a8061dc1305136c6c22b8baf0c0127a9").unwrap()
        );
    }

    #[test]
    fn update_split_is_equivalent() {
        let key = [0x42u8; 32];
        let msg = [0x5au8; 100];

        let mut whole = new_poly1305(&key);
        whole.update(&msg);
        let expect = whole.finalize();

        let mut split = new_poly1305(&key);
        for chunk in msg.chunks(7) {
            split.update(chunk);
        }
        assert_eq!(split.finalize(), expect);
    }
}
