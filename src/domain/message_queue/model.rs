//! Outbound message queue records

use chrono::{DateTime, Utc};
use serde_json::Value;

/// Persistence tier of an outbound Call.
///
/// CallResult/CallError replies are never queued and therefore have no
/// tier; they are written straight to the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueuePriority {
    /// Must survive restarts (TransactionEvent, BootNotification,
    /// StatusNotification, SecurityEventNotification).
    Transactional,
    /// Persisted best-effort (MeterValues, Authorize, Heartbeat).
    Normal,
}

impl QueuePriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueuePriority::Transactional => "Transactional",
            QueuePriority::Normal => "Normal",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Transactional" => Some(QueuePriority::Transactional),
            "Normal" => Some(QueuePriority::Normal),
            _ => None,
        }
    }

    /// Tier for an outbound action name.
    pub fn for_action(action: &str) -> Self {
        match action {
            "BootNotification"
            | "TransactionEvent"
            | "StatusNotification"
            | "SecurityEventNotification"
            | "FirmwareStatusNotification" => QueuePriority::Transactional,
            _ => QueuePriority::Normal,
        }
    }
}

/// One queued outbound Call, FIFO-ordered by the store.
#[derive(Debug, Clone)]
pub struct QueuedMessage {
    pub unique_id: String,
    pub action: String,
    pub payload: Value,
    pub priority: QueuePriority,
    /// Transmission attempts so far.
    pub attempts: i32,
    pub first_enqueued_at: DateTime<Utc>,
    /// Set for TransactionEvent so seq_no order can be tracked per
    /// transaction and GetTransactionStatus can be answered.
    pub transaction_id: Option<String>,
}

impl QueuedMessage {
    pub fn new(
        unique_id: impl Into<String>,
        action: impl Into<String>,
        payload: Value,
        transaction_id: Option<String>,
    ) -> Self {
        let action = action.into();
        Self {
            unique_id: unique_id.into(),
            priority: QueuePriority::for_action(&action),
            action,
            payload,
            attempts: 0,
            first_enqueued_at: Utc::now(),
            transaction_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_events_are_transactional() {
        assert_eq!(
            QueuePriority::for_action("TransactionEvent"),
            QueuePriority::Transactional
        );
        assert_eq!(
            QueuePriority::for_action("BootNotification"),
            QueuePriority::Transactional
        );
    }

    #[test]
    fn meter_values_are_normal() {
        assert_eq!(QueuePriority::for_action("MeterValues"), QueuePriority::Normal);
        assert_eq!(QueuePriority::for_action("Heartbeat"), QueuePriority::Normal);
    }

    #[test]
    fn priority_string_roundtrip() {
        for p in [QueuePriority::Transactional, QueuePriority::Normal] {
            assert_eq!(QueuePriority::parse(p.as_str()), Some(p));
        }
        assert_eq!(QueuePriority::parse("Volatile"), None);
    }
}
