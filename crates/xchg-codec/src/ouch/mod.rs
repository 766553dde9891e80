//! OUCH codec (C1): fixed-layout binary messages, each starting with a
//! one-byte message type, plus OUCH 5.0 variable-length appendages.

mod appendage;
mod messages;

pub use appendage::{Appendage, AppendageIter, appendage_type};
pub use messages::{EnterOrder, OrderAccepted, OrderCanceled, OrderRejected, Replace};

pub mod msg_type {
    pub const ENTER_ORDER: u8 = b'O';
    pub const CANCEL_ORDER: u8 = b'X';
    pub const REPLACE_ORDER: u8 = b'U';
    pub const MODIFY_ORDER: u8 = b'M';
    pub const ORDER_ACCEPTED: u8 = b'A';
    pub const ORDER_EXECUTED: u8 = b'E';
    pub const ORDER_CANCELED: u8 = b'C';
    pub const ORDER_REPLACED: u8 = b'U';
    pub const ORDER_REJECTED: u8 = b'J';
    pub const SYSTEM_EVENT: u8 = b'S';
}

/// Reject reason codes carried on `OrderRejected` (tag semantics per the wire
/// enumeration; values are the ASCII reason bytes themselves).
pub mod reject_reason {
    pub const TEST_MODE: u8 = b'T';
    pub const HALTED: u8 = b'H';
    pub const SHARES_EXCEED_THRESHOLD: u8 = b'Z';
    pub const INVALID_SYMBOL: u8 = b'S';
    pub const DISABLED: u8 = b'D';
    pub const INVALID_CAPACITY: u8 = b'C';
    pub const INVALID_PRICE: u8 = b'L';
    pub const INVALID_TOKEN: u8 = b'O';
    pub const INVALID_DISPLAY: u8 = b'I';
    pub const INVALID_MIN_QUANTITY: u8 = b'M';
    pub const INVALID_CROSS_TYPE: u8 = b'X';
    pub const INVALID_PEG: u8 = b'N';
    pub const WASH_TRADE: u8 = b'W';
    pub const OTHER: u8 = b'a';
}
