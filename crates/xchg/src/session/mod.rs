//! Session layer (C4): protocol-agnostic identity/config/runtime state plus
//! the FIX and OUCH state machines built on top of it.

pub mod any;
pub mod config;
pub mod error;
pub mod fix;
pub mod identity;
pub mod managed;
pub mod ouch;
pub mod runtime;

pub use any::{AnySession, AnySessionEvent};
pub use config::{EodTime, ProtocolVersion, SessionConfig};
pub use error::SessionError;
pub use identity::{Role, SessionIdentity};
pub use managed::{ManagedSession, ManagedState};
pub use runtime::RuntimeState;
