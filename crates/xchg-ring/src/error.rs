use thiserror::Error;

#[derive(Error, Debug, Copy, Clone, PartialEq)]
pub enum EmptyError {
    #[error("Lock empty")]
    Empty,
}

#[derive(Error, Debug, Copy, Clone, PartialEq)]
#[repr(u8)]
pub enum ReadError {
    #[error("Got sped past")]
    SpedPast,
    #[error("Lock empty")]
    Empty,
}

/// Surfaced to the ring's producer (`BufferFull` in the error taxonomy).
/// Never silent: the caller must observe and decide whether to drop or retry.
#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum RingError {
    #[error("ring full: write - read == capacity")]
    Full,
    #[error("payload of {0} bytes exceeds slot capacity of {1} bytes")]
    PayloadTooLarge(usize, usize),
}
