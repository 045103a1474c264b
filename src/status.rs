/// Failure count at which the connection is reported as degraded.
pub const DEGRADED_THRESHOLD: u32 = 3;
/// Failure count at which the connection is reported as severe.
pub const SEVERE_THRESHOLD: u32 = 5;

/// User-facing connectivity state derived from the failure counter.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum ConnectionStatus {
    /// No banner.
    #[default]
    Healthy,
    /// Warning banner with a "reload basic data" action.
    Degraded,
    /// Persistent banner with a manual reconnect action; an automatic
    /// reconnect is scheduled on entry.
    Severe,
}

impl ConnectionStatus {
    /// Step function over consecutive failures. Lower bounds are inclusive.
    pub fn from_failures(failures: u32) -> Self {
        if failures >= SEVERE_THRESHOLD {
            Self::Severe
        } else if failures >= DEGRADED_THRESHOLD {
            Self::Degraded
        } else {
            Self::Healthy
        }
    }

    /// Whether a warning banner is visible.
    pub fn shows_banner(self) -> bool {
        !matches!(self, Self::Healthy)
    }

    /// Whether the banner carries a "reconnect" action.
    pub fn offers_manual_reconnect(self) -> bool {
        matches!(self, Self::Severe)
    }

    /// Whether the banner carries a "reload basic data" action.
    pub fn offers_reload(self) -> bool {
        matches!(self, Self::Degraded)
    }
}

#[cfg(test)]
mod tests {
    use super::ConnectionStatus;

    #[test]
    fn thresholds_flip_exactly_at_three_and_five() {
        let expected = [
            (0, ConnectionStatus::Healthy),
            (1, ConnectionStatus::Healthy),
            (2, ConnectionStatus::Healthy),
            (3, ConnectionStatus::Degraded),
            (4, ConnectionStatus::Degraded),
            (5, ConnectionStatus::Severe),
            (6, ConnectionStatus::Severe),
            (u32::MAX, ConnectionStatus::Severe),
        ];
        for (failures, status) in expected {
            assert_eq!(ConnectionStatus::from_failures(failures), status, "{failures}");
        }
    }

    #[test]
    fn banner_actions_follow_severity() {
        assert!(!ConnectionStatus::Healthy.shows_banner());
        assert!(ConnectionStatus::Degraded.offers_reload());
        assert!(!ConnectionStatus::Degraded.offers_manual_reconnect());
        assert!(ConnectionStatus::Severe.offers_manual_reconnect());
        assert!(ConnectionStatus::Severe.shows_banner());
    }
}
