use crate::SeedRng;

/// Operating-system entropy. Nonce and IV generation is the only random
/// draw in the crate and a failing entropy source leaves nothing sensible
/// to continue with.
///
/// # Panics
///
/// `fill` panics if the operating system entropy source fails.
pub struct OsRng;

impl SeedRng for OsRng {
    fn fill(&mut self, buf: &mut [u8]) {
        getrandom::getrandom(buf).expect("operating system entropy source failed");
    }
}

// ----------------------------------------------------------------------------
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_whole_buffer() {
        // zero runs of this length do not happen by chance
        let mut buf = [0u8; 64];
        OsRng.fill(&mut buf);
        assert!(buf.iter().any(|&b| b != 0));
    }
}
