use thiserror::Error;

#[derive(Error, Debug)]
pub enum JournalError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("write failed: {0}")]
    WriteFailed(String),
    #[error("stream {0:?} has no segments")]
    EmptyStream(String),
    #[error("corrupt entry at segment {segment}, offset {offset}: {reason}")]
    Corrupt { segment: u32, offset: u64, reason: &'static str },
}

pub type JournalResult<T> = Result<T, JournalError>;
