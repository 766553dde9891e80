mod error;
pub mod ring;
mod seqlock;

pub use error::{EmptyError, ReadError, RingError};
pub use ring::{Consumer, DEFAULT_CAPACITY, DEFAULT_PAYLOAD_CAP, Producer, SlotHandle, ring};
pub use seqlock::Seqlock;
