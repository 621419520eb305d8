use crate::PortResult;

/// Issues a fresh short-lived signed token for each authenticated control
/// message
pub trait TokenProvider: Send + Sync {
    fn issue(&self) -> PortResult<String>;
}
