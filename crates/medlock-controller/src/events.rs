//! Events published to the UI layer.

use serde::{Deserialize, Serialize};

use medlock_core::SlotId;

use crate::error::{ControllerError, ErrorKind};
use crate::lifecycle::{SlotState, SlotTransition};

/// Point-in-time view of one slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotSnapshot {
    pub slot: SlotId,
    pub state: SlotState,

    /// Lock state from the last status reply; `None` before the first one.
    pub closed: Option<bool>,

    pub occupied: bool,
    pub content_id: Option<String>,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControllerEvent {
    Connection {
        connected: bool,
    },

    Reconnecting {
        attempt: u32,
    },

    SlotStateChanged {
        slot: SlotId,
        from: SlotState,
        to: SlotState,
    },

    /// Unlock sent for loading.
    Unlocking {
        slot: SlotId,
    },

    /// Dispense unlock sent on behalf of `user`.
    Dispensing {
        slot: SlotId,
        user: String,
    },

    /// Door shut and lifecycle finished.
    SlotClosed {
        slot: SlotId,
        occupied: bool,
    },

    /// Result of a full status check.
    Status {
        slots: Vec<SlotSnapshot>,
    },

    Error {
        kind: ErrorKind,
        message: String,
    },
}

impl ControllerEvent {
    pub fn error(err: &ControllerError) -> Self {
        Self::Error {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl From<&SlotTransition> for ControllerEvent {
    fn from(transition: &SlotTransition) -> Self {
        Self::SlotStateChanged {
            slot: transition.slot,
            from: transition.from,
            to: transition.to,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_tagged_json() {
        let event = ControllerEvent::SlotStateChanged {
            slot: SlotId::new(13).unwrap(),
            from: SlotState::WaitingForDispenseClose,
            to: SlotState::Idle,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "slot_state_changed");
        assert_eq!(json["slot"], 13);
        assert_eq!(json["from"], "waiting_for_dispense_close");
        assert_eq!(json["to"], "idle");
    }

    #[test]
    fn test_error_event() {
        let event = ControllerEvent::error(&ControllerError::AuthorizationFailed);
        assert_eq!(
            event,
            ControllerEvent::Error {
                kind: ErrorKind::AuthorizationFailed,
                message: "Authorization failed".into(),
            }
        );
    }
}
