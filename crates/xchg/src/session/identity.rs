/// Whether this session dials out or accepts inbound connections (§3).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Initiator,
    Acceptor,
}

/// Immutable tuple identifying a session; never mutates after creation
/// (invariant 5). Doubles as the journal stream key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionIdentity {
    pub session_name: String,
    pub sender_id: String,
    pub target_id: String,
    pub role: Role,
}

impl SessionIdentity {
    pub fn new(session_name: impl Into<String>, sender_id: impl Into<String>, target_id: impl Into<String>, role: Role) -> Self {
        Self { session_name: session_name.into(), sender_id: sender_id.into(), target_id: target_id.into(), role }
    }

    /// Canonical `sender_id->target_id` form used as the journal stream name.
    pub fn session_id(&self) -> String {
        format!("{}->{}", self.sender_id, self.target_id)
    }
}
