//! Published controller state

use serde::Serialize;

use crate::Result;

/// Read-only snapshot of a controller, as seen by subscribers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VadState {
    /// A detector is being constructed
    pub loading: bool,
    /// Message of the last construction failure
    pub error: Option<String>,
    /// A detector is present, not loading and not errored
    pub ready: bool,
    /// Detection has been started and not paused or terminated
    pub listening: bool,
    /// The last processed frame scored above the speaking threshold
    pub user_speaking: bool,
}

impl VadState {
    /// Check if the last initialization failed
    #[must_use]
    pub const fn is_errored(&self) -> bool {
        self.error.is_some()
    }

    /// Short label for the lifecycle state
    #[must_use]
    pub const fn phase(&self) -> &'static str {
        if self.loading {
            "loading"
        } else if self.error.is_some() {
            "errored"
        } else if self.listening {
            "listening"
        } else if self.ready {
            "ready"
        } else {
            "idle"
        }
    }

    /// Serialize the snapshot as JSON
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_state_is_idle() {
        let state = VadState::default();
        assert_eq!(state.phase(), "idle");
        assert!(!state.is_errored());
    }

    #[test]
    fn phase_prefers_loading_and_errors() {
        let state = VadState {
            loading: true,
            ..Default::default()
        };
        assert_eq!(state.phase(), "loading");

        let state = VadState {
            error: Some("permission denied".to_string()),
            ..Default::default()
        };
        assert_eq!(state.phase(), "errored");
    }

    #[test]
    fn serializes_to_json() {
        let state = VadState {
            ready: true,
            listening: true,
            ..Default::default()
        };
        let json = state.to_json().unwrap();
        assert!(json.contains("\"ready\":true"));
        assert!(json.contains("\"error\":null"));
    }
}
