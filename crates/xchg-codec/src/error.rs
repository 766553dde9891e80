use thiserror::Error;

/// Errors surfaced by both the FIX and OUCH/SoupBinTCP decoders. `NeedMore`
/// is not really an error; it is the decoder's way of saying "come back with
/// more bytes" and must never be logged as a failure.
#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("need more bytes to frame a complete message")]
    NeedMore,
    #[error("checksum mismatch")]
    ChecksumError,
    #[error("malformed frame: {0}")]
    MalformedFrame(&'static str),
    #[error("unknown message type {0}")]
    UnknownMsgType(u8),
    #[error("buffer too small to encode message")]
    BufferFull,
}

pub type CodecResult<T> = Result<T, CodecError>;
