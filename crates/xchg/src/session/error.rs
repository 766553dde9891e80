use thiserror::Error;
use xchg_codec::error::CodecError;
use xchg_journal::JournalError;

/// Errors a protocol FSM can raise while encoding, decoding, or journaling a
/// frame. Shared by both `fix::FixSession` and `ouch::OuchSession` since
/// neither adds protocol-specific error variants of its own.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Journal(#[from] JournalError),
}
