//! Connection state machine.

use serde::{Deserialize, Serialize};

/// Lifecycle state of the single session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No store opened yet.
    Uninitialized,
    /// Store open, no live handle.
    Unpaired,
    /// A pairing stream is being consumed.
    Pairing,
    /// A live, connected handle is installed.
    Connected,
    /// Logout and store deletion in progress.
    Disconnecting,
    /// Full teardown and store re-creation in progress.
    Resetting,
}

impl ConnectionState {
    /// Check if this state allows transitioning to another state.
    pub fn can_transition_to(&self, target: ConnectionState) -> bool {
        use ConnectionState::*;

        if target == Resetting {
            return true;
        }

        matches!(
            (self, target),
            // From Uninitialized (Init with or without stored credentials)
            (Uninitialized, Unpaired) | (Uninitialized, Connected) |
            // From Unpaired (Connect, or restore from stored credentials)
            (Unpaired, Pairing) | (Unpaired, Connected) |
            // From Pairing
            (Pairing, Connected) | (Pairing, Unpaired) | (Pairing, Disconnecting) |
            // From Connected (Disconnect, or a dropped handle found by Connect)
            (Connected, Disconnecting) | (Connected, Unpaired) |
            // From Disconnecting
            (Disconnecting, Unpaired) |
            // From Resetting (Reset ends Unpaired, ForceWipe ends Uninitialized)
            (Resetting, Unpaired) | (Resetting, Uninitialized)
        )
    }

    /// Whether a Disconnect has anything to tear down.
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Connected | Self::Pairing)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Uninitialized => "uninitialized",
            Self::Unpaired => "unpaired",
            Self::Pairing => "pairing",
            Self::Connected => "connected",
            Self::Disconnecting => "disconnecting",
            Self::Resetting => "resetting",
        };
        write!(f, "{}", s)
    }
}
