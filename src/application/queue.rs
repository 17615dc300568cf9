//! Outbound message queue
//!
//! Persists outbound Calls and enforces the OCPP-J request/response
//! discipline: one in-flight Call toward the CSMS, FIFO replay after
//! reconnect with the original uniqueId (the CSMS deduplicates),
//! response timeout with bounded retransmission, and registration
//! gating (before BootNotification is Accepted only BootNotification
//! and SecurityEventNotification may leave the station).
//!
//! The queue is owned by the protocol task; responses are matched here
//! and handed back to the caller as `(message, outcome)` pairs.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::message_queue::{MessageQueueRepository, QueuePriority, QueuedMessage};
use crate::interfaces::ws::ConnectivityManager;
use crate::support::errors::DomainResult;
use crate::support::ocpp_frame::{OcppErrorCode, OcppFrame};

// ── Configuration and outcomes ─────────────────────────────────

#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Response deadline for an in-flight Call.
    pub message_timeout: Duration,
    /// Transmission attempts before a Call is dropped as timed out.
    pub max_attempts: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            message_timeout: Duration::from_secs(30),
            max_attempts: 3,
        }
    }
}

/// Terminal outcome of an outbound Call, delivered to its originator.
#[derive(Debug)]
pub enum CallOutcome {
    /// CallResult payload.
    Result(Value),
    /// CallError from the CSMS; not retried at queue level.
    Error {
        code: OcppErrorCode,
        description: String,
        details: Value,
    },
    /// No response within the deadline, attempts exhausted.
    Timeout,
    /// Link lost while a non-transactional Call was in flight.
    Transport,
}

/// What the protocol task should do with an inbound frame.
#[derive(Debug)]
pub enum QueueDisposition {
    /// A Call from the CSMS to dispatch to a handler.
    InboundCall {
        unique_id: String,
        action: String,
        payload: Value,
    },
    /// A response matched the in-flight Call.
    Resolved {
        message: QueuedMessage,
        outcome: CallOutcome,
    },
    /// Malformed or unsupported frame; send this reply back.
    ProtocolViolation { reply: OcppFrame },
    /// Nothing to do (e.g. response to a long-forgotten Call).
    Ignored,
}

/// Result of a transmit attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum TransmitOutcome {
    /// Frame is on the wire; arm a response timeout for this id.
    Sent { unique_id: String },
    /// Nothing eligible (empty, gated, in-flight, or link down).
    Idle,
    /// The write failed; the head stays queued for the next link.
    LinkLost,
}

/// The transport the queue writes to. `ConnectivityManager` is the
/// production implementation; tests substitute their own.
#[async_trait]
pub trait FrameSink: Send + Sync {
    async fn send_frame(&self, text: String) -> bool;
}

#[async_trait]
impl FrameSink for ConnectivityManager {
    async fn send_frame(&self, text: String) -> bool {
        self.send(text).await
    }
}

// ── MessageQueue ───────────────────────────────────────────────

pub struct MessageQueue {
    repo: Arc<dyn MessageQueueRepository>,
    pending: VecDeque<QueuedMessage>,
    in_flight: Option<QueuedMessage>,
    link_up: bool,
    registration_accepted: bool,
    config: QueueConfig,
}

impl MessageQueue {
    pub fn new(repo: Arc<dyn MessageQueueRepository>, config: QueueConfig) -> Self {
        Self {
            repo,
            pending: VecDeque::new(),
            in_flight: None,
            link_up: false,
            registration_accepted: false,
            config,
        }
    }

    pub fn message_timeout(&self) -> Duration {
        self.config.message_timeout
    }

    /// Reload unacknowledged messages from the store. The persisted
    /// uniqueIds are kept: retransmitting under the same id lets the
    /// CSMS deduplicate what it already processed.
    pub async fn restore(&mut self) -> DomainResult<usize> {
        let restored = self.repo.load_all().await?;
        let count = restored.len();
        self.pending = restored.into();
        if count > 0 {
            info!(count, "Restored queued messages from store");
        }
        Ok(count)
    }

    /// Append an outbound Call. Transactional-tier persistence errors
    /// propagate (losing a TransactionEvent silently is not an
    /// option); Normal-tier persistence is best-effort.
    pub async fn enqueue(
        &mut self,
        action: &str,
        payload: Value,
        transaction_id: Option<String>,
    ) -> DomainResult<String> {
        let message = QueuedMessage::new(
            Uuid::new_v4().to_string(),
            action,
            payload,
            transaction_id,
        );

        match message.priority {
            QueuePriority::Transactional => self.repo.push(&message).await?,
            QueuePriority::Normal => {
                if let Err(e) = self.repo.push(&message).await {
                    warn!(action, error = %e, "Best-effort persistence failed");
                }
            }
        }

        debug!(
            unique_id = message.unique_id.as_str(),
            action,
            queued = self.pending.len() + 1,
            "Enqueued outbound call"
        );
        let unique_id = message.unique_id.clone();
        self.pending.push_back(message);
        Ok(unique_id)
    }

    pub fn set_link_up(&mut self, up: bool) {
        self.link_up = up;
    }

    pub fn set_registration_accepted(&mut self, accepted: bool) {
        self.registration_accepted = accepted;
    }

    fn head_allowed(&self) -> bool {
        match self.pending.front() {
            None => false,
            Some(head) => {
                self.registration_accepted
                    || head.action == "BootNotification"
                    || head.action == "SecurityEventNotification"
            }
        }
    }

    /// Transmit the head if the link is up, nothing is in flight, and
    /// registration gating allows it.
    pub async fn try_transmit(&mut self, sink: &dyn FrameSink) -> TransmitOutcome {
        if !self.link_up || self.in_flight.is_some() || !self.head_allowed() {
            return TransmitOutcome::Idle;
        }

        // head_allowed() verified the deque is non-empty.
        let Some(mut message) = self.pending.pop_front() else {
            return TransmitOutcome::Idle;
        };

        message.attempts += 1;
        if let Err(e) = self
            .repo
            .update_attempts(&message.unique_id, message.attempts)
            .await
        {
            warn!(error = %e, "Could not persist attempt counter");
        }

        let frame = OcppFrame::Call {
            unique_id: message.unique_id.clone(),
            action: message.action.clone(),
            payload: message.payload.clone(),
        };

        debug!(
            unique_id = message.unique_id.as_str(),
            action = message.action.as_str(),
            attempt = message.attempts,
            "Transmitting call"
        );

        if sink.send_frame(frame.serialize()).await {
            let unique_id = message.unique_id.clone();
            self.in_flight = Some(message);
            TransmitOutcome::Sent { unique_id }
        } else {
            self.link_up = false;
            self.pending.push_front(message);
            TransmitOutcome::LinkLost
        }
    }

    /// Classify an inbound text frame.
    pub async fn on_frame(&mut self, text: &str) -> QueueDisposition {
        let frame = match OcppFrame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Malformed inbound frame");
                return match extract_unique_id(text) {
                    Some(unique_id) => QueueDisposition::ProtocolViolation {
                        reply: OcppFrame::error_response(unique_id, e.error_code(), e.to_string()),
                    },
                    None => QueueDisposition::Ignored,
                };
            }
        };

        match frame {
            OcppFrame::Call {
                unique_id,
                action,
                payload,
            } => QueueDisposition::InboundCall {
                unique_id,
                action,
                payload,
            },
            OcppFrame::CallResult { unique_id, payload } => {
                self.resolve(&unique_id, CallOutcome::Result(payload)).await
            }
            OcppFrame::CallError {
                unique_id,
                error_code,
                error_description,
                error_details,
            } => {
                self.resolve(
                    &unique_id,
                    CallOutcome::Error {
                        code: error_code,
                        description: error_description,
                        details: error_details,
                    },
                )
                .await
            }
        }
    }

    async fn resolve(&mut self, unique_id: &str, outcome: CallOutcome) -> QueueDisposition {
        let is_in_flight = self
            .in_flight
            .as_ref()
            .map_or(false, |m| m.unique_id == unique_id);
        if !is_in_flight {
            debug!(unique_id, "Response for unknown call, ignoring");
            return QueueDisposition::Ignored;
        }

        if let Err(e) = self.repo.delete(unique_id).await {
            warn!(unique_id, error = %e, "Could not delete acked record");
        }
        match self.in_flight.take() {
            Some(message) => QueueDisposition::Resolved { message, outcome },
            None => QueueDisposition::Ignored,
        }
    }

    /// The response deadline for `unique_id` elapsed. Requeues at the
    /// head while attempts remain; afterwards the record is dropped
    /// and the originator gets a timeout outcome.
    pub async fn on_timeout(&mut self, unique_id: &str) -> Option<(QueuedMessage, CallOutcome)> {
        let is_in_flight = self
            .in_flight
            .as_ref()
            .map_or(false, |m| m.unique_id == unique_id);
        if !is_in_flight {
            return None;
        }
        let message = self.in_flight.take()?;

        if (message.attempts as u32) < self.config.max_attempts {
            warn!(
                unique_id,
                attempt = message.attempts,
                "Call timed out, requeueing at head"
            );
            self.pending.push_front(message);
            None
        } else {
            warn!(
                unique_id,
                attempts = message.attempts,
                "Call timed out, dropping"
            );
            if let Err(e) = self.repo.delete(unique_id).await {
                warn!(unique_id, error = %e, "Could not delete timed-out record");
            }
            Some((message, CallOutcome::Timeout))
        }
    }

    /// The link went down. A transactional in-flight Call is requeued
    /// at the head with its uniqueId intact and its waiter stays
    /// pending; a Normal-tier Call is dropped and its waiter told.
    pub async fn on_link_down(&mut self) -> Option<(QueuedMessage, CallOutcome)> {
        self.link_up = false;

        let message = self.in_flight.take()?;
        match message.priority {
            QueuePriority::Transactional => {
                debug!(
                    unique_id = message.unique_id.as_str(),
                    "Link lost mid-send, requeueing transactional call"
                );
                self.pending.push_front(message);
                None
            }
            QueuePriority::Normal => {
                if let Err(e) = self.repo.delete(&message.unique_id).await {
                    warn!(error = %e, "Could not delete cancelled record");
                }
                Some((message, CallOutcome::Transport))
            }
        }
    }

    /// Whether anything is queued or in flight (optionally for one
    /// transaction); answers GetTransactionStatus.
    pub fn messages_in_queue(&self, transaction_id: Option<&str>) -> bool {
        let matches = |m: &QueuedMessage| match transaction_id {
            Some(tx) => m.transaction_id.as_deref() == Some(tx),
            None => true,
        };
        self.pending.iter().any(matches) || self.in_flight.as_ref().map_or(false, matches)
    }
}

/// Best-effort uniqueId extraction from a frame that failed strict
/// parsing, so the CallError reply can carry the matching id.
fn extract_unique_id(text: &str) -> Option<String> {
    let arr: Vec<Value> = serde_json::from_str(text).ok()?;
    let id = arr.get(1)?.as_str()?;
    if id.is_empty() || id.len() > crate::support::ocpp_frame::MAX_UNIQUE_ID_LEN {
        return None;
    }
    Some(id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database::repositories::SeaOrmMessageQueueRepository;
    use crate::infrastructure::database::{init_database, DatabaseConfig};
    use serde_json::json;
    use std::sync::Mutex;

    struct RecordingSink {
        frames: Mutex<Vec<String>>,
        up: Mutex<bool>,
    }

    impl RecordingSink {
        fn new() -> Self {
            Self {
                frames: Mutex::new(Vec::new()),
                up: Mutex::new(true),
            }
        }

        fn sent(&self) -> Vec<String> {
            self.frames.lock().unwrap().clone()
        }

        fn set_up(&self, up: bool) {
            *self.up.lock().unwrap() = up;
        }
    }

    #[async_trait]
    impl FrameSink for RecordingSink {
        async fn send_frame(&self, text: String) -> bool {
            if !*self.up.lock().unwrap() {
                return false;
            }
            self.frames.lock().unwrap().push(text);
            true
        }
    }

    async fn queue() -> MessageQueue {
        let db = init_database(&DatabaseConfig::in_memory()).await.unwrap();
        let repo = Arc::new(SeaOrmMessageQueueRepository::new(db));
        MessageQueue::new(
            repo,
            QueueConfig {
                message_timeout: Duration::from_secs(30),
                max_attempts: 2,
            },
        )
    }

    #[tokio::test]
    async fn one_call_in_flight_at_a_time() {
        let mut q = queue().await;
        let sink = RecordingSink::new();
        q.set_link_up(true);
        q.set_registration_accepted(true);

        q.enqueue("Heartbeat", json!({}), None).await.unwrap();
        q.enqueue("Heartbeat", json!({}), None).await.unwrap();

        assert!(matches!(
            q.try_transmit(&sink).await,
            TransmitOutcome::Sent { .. }
        ));
        // Second transmit blocks until the first resolves.
        assert_eq!(q.try_transmit(&sink).await, TransmitOutcome::Idle);
        assert_eq!(sink.sent().len(), 1);
    }

    #[tokio::test]
    async fn registration_gating_blocks_everything_but_boot() {
        let mut q = queue().await;
        let sink = RecordingSink::new();
        q.set_link_up(true);

        q.enqueue("Heartbeat", json!({}), None).await.unwrap();
        assert_eq!(q.try_transmit(&sink).await, TransmitOutcome::Idle);

        // The gate checks the head only; a queue with Boot at the head
        // does transmit.
        let mut q2 = queue().await;
        q2.set_link_up(true);
        q2.enqueue("BootNotification", json!({"reason": "PowerUp"}), None)
            .await
            .unwrap();
        assert!(matches!(
            q2.try_transmit(&sink).await,
            TransmitOutcome::Sent { .. }
        ));
    }

    #[tokio::test]
    async fn call_result_resolves_and_deletes_record() {
        let mut q = queue().await;
        let sink = RecordingSink::new();
        q.set_link_up(true);
        q.set_registration_accepted(true);

        q.enqueue("TransactionEvent", json!({"seqNo": 0}), Some("txn-1".into()))
            .await
            .unwrap();
        let uid = match q.try_transmit(&sink).await {
            TransmitOutcome::Sent { unique_id } => unique_id,
            other => panic!("expected Sent, got {:?}", other),
        };

        assert!(q.messages_in_queue(Some("txn-1")));

        let reply = format!(r#"[3,"{}",{{}}]"#, uid);
        match q.on_frame(&reply).await {
            QueueDisposition::Resolved { message, outcome } => {
                assert_eq!(message.unique_id, uid);
                assert!(matches!(outcome, CallOutcome::Result(_)));
            }
            other => panic!("expected Resolved, got {:?}", other),
        }

        // The persisted record is gone (round-trip law).
        assert_eq!(q.repo.load_all().await.unwrap().len(), 0);
        assert!(!q.messages_in_queue(Some("txn-1")));
    }

    #[tokio::test]
    async fn link_flap_retransmits_identical_frame() {
        let mut q = queue().await;
        let sink = RecordingSink::new();
        q.set_link_up(true);
        q.set_registration_accepted(true);

        q.enqueue("TransactionEvent", json!({"seqNo": 1}), Some("txn-1".into()))
            .await
            .unwrap();
        let uid = match q.try_transmit(&sink).await {
            TransmitOutcome::Sent { unique_id } => unique_id,
            other => panic!("expected Sent, got {:?}", other),
        };

        // Link drops before the response: record goes back to the head.
        assert!(q.on_link_down().await.is_none());

        q.set_link_up(true);
        match q.try_transmit(&sink).await {
            TransmitOutcome::Sent { unique_id } => assert_eq!(unique_id, uid),
            other => panic!("expected Sent, got {:?}", other),
        }

        let frames = sink.sent();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0], frames[1], "replay must be byte-identical");
    }

    #[tokio::test]
    async fn normal_tier_waiter_is_cancelled_on_link_down() {
        let mut q = queue().await;
        let sink = RecordingSink::new();
        q.set_link_up(true);
        q.set_registration_accepted(true);

        q.enqueue("Heartbeat", json!({}), None).await.unwrap();
        let _ = q.try_transmit(&sink).await;

        match q.on_link_down().await {
            Some((message, CallOutcome::Transport)) => {
                assert_eq!(message.action, "Heartbeat");
            }
            other => panic!("expected Transport cancellation, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn timeout_requeues_then_drops() {
        let mut q = queue().await;
        let sink = RecordingSink::new();
        q.set_link_up(true);
        q.set_registration_accepted(true);

        q.enqueue("TransactionEvent", json!({}), Some("txn-1".into()))
            .await
            .unwrap();

        // Attempt 1 times out: requeued.
        let uid = match q.try_transmit(&sink).await {
            TransmitOutcome::Sent { unique_id } => unique_id,
            other => panic!("expected Sent, got {:?}", other),
        };
        assert!(q.on_timeout(&uid).await.is_none());

        // Attempt 2 (max_attempts = 2) times out: dropped with outcome.
        let uid2 = match q.try_transmit(&sink).await {
            TransmitOutcome::Sent { unique_id } => unique_id,
            other => panic!("expected Sent, got {:?}", other),
        };
        assert_eq!(uid, uid2);
        match q.on_timeout(&uid2).await {
            Some((_, CallOutcome::Timeout)) => {}
            other => panic!("expected Timeout, got {:?}", other),
        }
        assert_eq!(q.repo.load_all().await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn write_failure_keeps_head_queued() {
        let mut q = queue().await;
        let sink = RecordingSink::new();
        sink.set_up(false);
        q.set_link_up(true);
        q.set_registration_accepted(true);

        q.enqueue("StatusNotification", json!({}), None).await.unwrap();
        assert_eq!(q.try_transmit(&sink).await, TransmitOutcome::LinkLost);
        assert!(q.messages_in_queue(None));
        // A later link brings it out again.
        sink.set_up(true);
        q.set_link_up(true);
        assert!(matches!(
            q.try_transmit(&sink).await,
            TransmitOutcome::Sent { .. }
        ));
    }

    #[tokio::test]
    async fn restore_preserves_order_and_ids() {
        let db = init_database(&DatabaseConfig::in_memory()).await.unwrap();
        let repo = Arc::new(SeaOrmMessageQueueRepository::new(db));

        {
            let mut q = MessageQueue::new(repo.clone(), QueueConfig::default());
            q.enqueue("TransactionEvent", json!({"seqNo": 0}), Some("txn-1".into()))
                .await
                .unwrap();
            q.enqueue("TransactionEvent", json!({"seqNo": 1}), Some("txn-1".into()))
                .await
                .unwrap();
        }

        // "Reboot": a fresh queue over the same store.
        let mut q = MessageQueue::new(repo, QueueConfig::default());
        assert_eq!(q.restore().await.unwrap(), 2);
        assert!(q.messages_in_queue(Some("txn-1")));
        assert_eq!(q.pending[0].payload["seqNo"], 0);
        assert_eq!(q.pending[1].payload["seqNo"], 1);
    }

    #[tokio::test]
    async fn inbound_call_is_dispatched() {
        let mut q = queue().await;
        let disposition = q
            .on_frame(r#"[2,"id-1","Reset",{"type":"Immediate"}]"#)
            .await;
        match disposition {
            QueueDisposition::InboundCall {
                unique_id, action, ..
            } => {
                assert_eq!(unique_id, "id-1");
                assert_eq!(action, "Reset");
            }
            other => panic!("expected InboundCall, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn malformed_frame_yields_protocol_violation_reply() {
        let mut q = queue().await;
        match q.on_frame(r#"[9,"id-7",{}]"#).await {
            QueueDisposition::ProtocolViolation { reply } => {
                assert_eq!(reply.unique_id(), "id-7");
                let json = reply.serialize();
                assert!(json.contains("NotSupported"));
            }
            other => panic!("expected ProtocolViolation, got {:?}", other),
        }

        // Unparseable garbage has no id to reply to.
        assert!(matches!(
            q.on_frame("not json").await,
            QueueDisposition::Ignored
        ));
    }
}
