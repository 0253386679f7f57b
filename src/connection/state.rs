//! Connection lifecycle state machine.

/// Lifecycle of a connection.
///
/// `Connecting → SettingUp → Active → Closing → Closed`, with error
/// transitions to `Closed` from any state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConnectionState {
    /// Transport established, handshake not begun.
    Connecting,
    /// SETUP sent (client) or awaited (server).
    SettingUp,
    /// Streams may be opened and served.
    Active,
    /// A graceful close is draining.
    Closing,
    /// The connection is finished.
    Closed,
}

impl ConnectionState {
    /// Whether new interactions may be initiated.
    #[must_use]
    pub const fn is_active(self) -> bool { matches!(self, Self::Active) }

    /// Whether the connection has begun (or finished) closing.
    #[must_use]
    pub const fn is_closing(self) -> bool { matches!(self, Self::Closing | Self::Closed) }

    /// Move to `next`, never regressing.
    pub fn advance(&mut self, next: Self) {
        if next > *self {
            log::debug!("connection state {self:?} -> {next:?}");
            *self = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_advance_monotonically() {
        let mut state = ConnectionState::Connecting;
        state.advance(ConnectionState::SettingUp);
        state.advance(ConnectionState::Active);
        assert!(state.is_active());
        state.advance(ConnectionState::SettingUp);
        assert!(state.is_active());
        state.advance(ConnectionState::Closed);
        assert!(state.is_closing());
    }
}
