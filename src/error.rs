use thiserror::Error;

/// Everything that can go wrong across init, update and finalize.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CipherError {
    #[error("invalid key: {0}")]
    InvalidKey(&'static str),

    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),

    #[error("output buffer too small, need {needed} bytes")]
    BufferTooSmall { needed: usize },

    #[error("tag mismatch")]
    AuthenticationFailed,

    #[error("keystream counter exhausted")]
    CounterExhausted,

    #[error("illegal state: {0}")]
    IllegalState(&'static str),
}

pub type Result<T> = core::result::Result<T, CipherError>;
