//! EngineEvent enum: broadcast from the engine to renderers and the ack sender.

use serde::{Deserialize, Serialize};

use crate::types::{Ack, RateData, RejectedData, TickFailedData, TransitionData};

/// Events broadcast from the engine task to all subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum EngineEvent {
    /// Active expression changed
    #[serde(rename = "expression")]
    Expression(TransitionData),

    /// A wire command was applied; the channel turns this into a datagram
    #[serde(rename = "ack")]
    Ack(Ack),

    /// A requested expression name was not in the table
    #[serde(rename = "rejected")]
    Rejected(RejectedData),

    /// A tick was rolled back
    #[serde(rename = "tick_failed")]
    TickFailed(TickFailedData),

    /// Tick rate changed
    #[serde(rename = "rate")]
    Rate(RateData),
}

impl EngineEvent {
    /// Serialize to `{"event": "...", "data": {...}}`.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TransitionReason;

    #[test]
    fn test_event_json_shape() {
        let event = EngineEvent::Expression(TransitionData {
            from: "idle".into(),
            to: "happy".into(),
            reason: TransitionReason::Command,
        });
        let json = event.to_json();
        assert_eq!(json["event"], "expression");
        assert_eq!(json["data"]["to"], "happy");
        assert_eq!(json["data"]["reason"], "command");
    }
}
