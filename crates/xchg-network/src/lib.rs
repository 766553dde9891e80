//! Non-blocking `mio`-based TCP transport. Carries no wire framing of its
//! own — FIX/OUCH/SoupBinTCP framing lives in `xchg-codec` and is driven by
//! the caller over each connection's raw inbound byte buffer (§4.5).

pub mod tcp;
