/// Common state set every protocol-specific FSM maps its own states onto
/// (design note: "unify FIX, OUCH, and SBE sessions behind a single
/// `ManagedSession` capability").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ManagedState {
    Disconnected,
    Connecting,
    Connected,
    LoggedOn,
    Stopped,
}

/// Capability every per-protocol session exposes to the engine: identity,
/// coarse state, the enable/disable flag, and sequence accessors. The
/// engine's scheduler and lifecycle code are written against this instead of
/// against `FixSession`/`OuchSession` directly.
pub trait ManagedSession {
    fn session_id(&self) -> &str;
    fn managed_state(&self) -> ManagedState;
    fn enable(&mut self);
    fn disable(&mut self);
    fn is_enabled(&self) -> bool;
    fn outgoing_seq(&self) -> u32;
    fn expected_incoming_seq(&self) -> u32;
}
