use zeroize::Zeroize;

// Growable stash for bytes an engine cannot process yet: sub-block
// remainders while encrypting, the whole ciphertext while decrypting.
// Contents are wiped on reset and on drop since the encrypt side
// stashes plaintext.
pub(crate) struct Stash {
    buf: Vec<u8>,
}

// ----------------------------------------------------------------------------
impl Stash {
    pub fn new() -> Stash {
        Stash { buf: Vec::new() }
    }

    pub fn with_capacity(cap: usize) -> Stash {
        Stash { buf: Vec::with_capacity(cap) }
    }

    pub fn write(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn reset(&mut self) {
        self.buf.zeroize();
        self.buf.clear();
    }
}

impl Drop for Stash {
    fn drop(&mut self) {
        self.buf.zeroize();
    }
}
