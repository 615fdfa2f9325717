//! Analog bus connection state owned by the acquisition loop.

/// Connection state machine:
/// Disconnected -> Connecting -> Connected -> (Disconnected on failure) -> ... -> PermanentlyFailed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BusState {
    #[default]
    Disconnected,
    /// A connect attempt is in flight.
    Connecting,
    Connected,
    /// Retry limit reached; terminal.
    PermanentlyFailed,
}

impl BusState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BusState::Disconnected => "disconnected",
            BusState::Connecting => "connecting",
            BusState::Connected => "connected",
            BusState::PermanentlyFailed => "permanently_failed",
        }
    }
}

/// Copy of the bus connection state handed to readers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BusStatus {
    pub state: BusState,
    pub consecutive_failures: u32,
}
