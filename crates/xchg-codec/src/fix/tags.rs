//! Tag numbers used by the session layer. Application-level tags are left to
//! callers; the codec only needs to know the ones it frames, validates, or
//! that the session FSM inspects directly.

pub const TAG_BEGIN_STRING: u32 = 8;
pub const TAG_BODY_LENGTH: u32 = 9;
pub const TAG_CHECKSUM: u32 = 10;
pub const TAG_MSG_SEQ_NUM: u32 = 34;
pub const TAG_MSG_TYPE: u32 = 35;
pub const TAG_SENDER_COMP_ID: u32 = 49;
pub const TAG_TARGET_COMP_ID: u32 = 56;
pub const TAG_SENDING_TIME: u32 = 52;
pub const TAG_ENCRYPT_METHOD: u32 = 98;
pub const TAG_HEART_BT_INT: u32 = 108;
pub const TAG_TEST_REQ_ID: u32 = 112;
pub const TAG_RESET_SEQ_NUM_FLAG: u32 = 141;
pub const TAG_POSS_DUP_FLAG: u32 = 43;
pub const TAG_ORIG_SENDING_TIME: u32 = 122;
pub const TAG_GAP_FILL_FLAG: u32 = 123;
pub const TAG_NEW_SEQ_NO: u32 = 36;
pub const TAG_BEGIN_SEQ_NO: u32 = 7;
pub const TAG_END_SEQ_NO: u32 = 16;
pub const TAG_TEXT: u32 = 58;
pub const TAG_REF_SEQ_NUM: u32 = 45;
pub const TAG_REF_MSG_TYPE: u32 = 372;
pub const TAG_REF_TAG_ID: u32 = 371;
pub const TAG_SESSION_REJECT_REASON: u32 = 373;

pub mod msg_type {
    pub const HEARTBEAT: &str = "0";
    pub const TEST_REQUEST: &str = "1";
    pub const RESEND_REQUEST: &str = "2";
    pub const REJECT: &str = "3";
    pub const SEQUENCE_RESET: &str = "4";
    pub const LOGOUT: &str = "5";
    pub const LOGON: &str = "A";
}

/// `SessionRejectReason` (tag 373) values the FSM needs to produce.
pub mod session_reject_reason {
    pub const INVALID_TAG_NUMBER: i32 = 0;
    pub const REQUIRED_TAG_MISSING: i32 = 1;
    pub const VALUE_IS_INCORRECT: i32 = 5;
    pub const INCORRECT_DATA_FORMAT: i32 = 6;
    pub const INVALID_MSGTYPE: i32 = 11;
}
