use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    Disconnected,
    ConnectingLogin,
    LoggingInLogin,
    ConnectingBase,
    LoggingInBase,
    Active,
    ReconnectingBase,
}

impl ConnectionState {
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (_, Disconnected)
                | (Disconnected, ConnectingLogin)
                | (ConnectingLogin, LoggingInLogin)
                | (LoggingInLogin, ConnectingBase)
                | (ConnectingBase, LoggingInBase)
                | (LoggingInBase, Active)
                | (Disconnected, ReconnectingBase)
                | (ReconnectingBase, LoggingInBase)
        ) && self != next
    }

    pub fn is_connected(self) -> bool {
        matches!(
            self,
            Self::LoggingInLogin | Self::LoggingInBase | Self::Active
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::ConnectingLogin => "connecting to login",
            Self::LoggingInLogin => "logging in (login)",
            Self::ConnectingBase => "connecting to gameplay",
            Self::LoggingInBase => "logging in (gameplay)",
            Self::Active => "active",
            Self::ReconnectingBase => "reconnecting to gameplay",
        };
        f.write_str(name)
    }
}

/// Which tier the current transport talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tier {
    Auth,
    Gameplay,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auth => f.write_str("auth"),
            Self::Gameplay => f.write_str("gameplay"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ConnectionState::*;

    #[test]
    fn only_sequential_transitions() {
        let login_path = [
            Disconnected,
            ConnectingLogin,
            LoggingInLogin,
            ConnectingBase,
            LoggingInBase,
            Active,
        ];
        for pair in login_path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{:?}", pair);
        }
        assert!(Disconnected.can_transition_to(ReconnectingBase));
        assert!(ReconnectingBase.can_transition_to(LoggingInBase));

        assert!(!Disconnected.can_transition_to(Active));
        assert!(!ConnectingLogin.can_transition_to(ConnectingBase));
        assert!(!LoggingInLogin.can_transition_to(Active));
        assert!(!Active.can_transition_to(LoggingInBase));
        assert!(!Disconnected.can_transition_to(Disconnected));
        for state in login_path {
            assert!(state == Disconnected || state.can_transition_to(Disconnected));
        }
    }
}
