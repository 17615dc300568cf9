//! Charge point facade
//!
//! The protocol task. Owns the connectivity manager, the message
//! queue, the transaction manager, and dispatch of inbound Calls; it
//! never blocks on I/O and consumes everything (link events, hardware
//! events, timers) from channels in arrival order.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use rust_ocpp::v2_0_1::datatypes::charging_station_type::ChargingStationType;
use rust_ocpp::v2_0_1::datatypes::evse_type::EVSEType;
use rust_ocpp::v2_0_1::datatypes::firmware_type::FirmwareType;
use rust_ocpp::v2_0_1::datatypes::id_token_type::IdTokenType;
use rust_ocpp::v2_0_1::datatypes::meter_value_type::MeterValueType;
use rust_ocpp::v2_0_1::enumerations::authorization_status_enum_type::AuthorizationStatusEnumType;
use rust_ocpp::v2_0_1::enumerations::boot_reason_enum_type::BootReasonEnumType;
use rust_ocpp::v2_0_1::enumerations::connector_status_enum_type::ConnectorStatusEnumType;
use rust_ocpp::v2_0_1::enumerations::operational_status_enum_type::OperationalStatusEnumType;
use rust_ocpp::v2_0_1::enumerations::registration_status_enum_type::RegistrationStatusEnumType;
use rust_ocpp::v2_0_1::enumerations::request_start_stop_status_enum_type::RequestStartStopStatusEnumType;
use rust_ocpp::v2_0_1::enumerations::reset_enum_type::ResetEnumType;
use rust_ocpp::v2_0_1::enumerations::transaction_event_enum_type::TransactionEventEnumType;
use rust_ocpp::v2_0_1::enumerations::trigger_reason_enum_type::TriggerReasonEnumType;
use rust_ocpp::v2_0_1::enumerations::unlock_status_enum_type::UnlockStatusEnumType;
use rust_ocpp::v2_0_1::messages::authorize::{AuthorizeRequest, AuthorizeResponse};
use rust_ocpp::v2_0_1::messages::boot_notification::{
    BootNotificationRequest, BootNotificationResponse,
};
use rust_ocpp::v2_0_1::messages::request_start_transaction::RequestStartTransactionRequest;
use rust_ocpp::v2_0_1::messages::security_event_notification::SecurityEventNotificationRequest;
use rust_ocpp::v2_0_1::messages::status_notification::StatusNotificationRequest;
use rust_ocpp::v2_0_1::messages::transaction_event::TransactionEventRequest;
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant};
use tracing::{debug, error, info, warn};

use crate::application::device_model::DeviceModel;
use crate::application::events::{HardwareEvent, StationEvent, TimerId};
use crate::application::handlers;
use crate::application::queue::{
    CallOutcome, MessageQueue, QueueConfig, QueueDisposition, TransmitOutcome,
};
use crate::application::timers::{until_next_aligned, until_next_session_tick, TimerWheel};
use crate::application::transactions::TransactionManager;
use crate::config::StationConfig;
use crate::domain::auth::id_token_hash;
use crate::domain::availability::ComponentScope;
use crate::domain::transaction::Transaction;
use crate::infrastructure::database::SeaOrmStore;
use crate::interfaces::ws::link::LinkEvent;
use crate::interfaces::ws::connectivity::LinkDisposition;
use crate::interfaces::ws::{CloseReason, ConnectivityManager};
use crate::support::errors::{StationError, StationResult};
use crate::support::ocpp_frame::{OcppErrorCode, OcppFrame};
use crate::support::shutdown::ShutdownSignal;

const EVENT_CHANNEL_CAPACITY: usize = 64;
/// Cache entries evicted per pass once the size cap is exceeded.
const AUTH_CACHE_EVICTION_BATCH: u64 = 16;

// ── Callbacks toward the hardware driver ───────────────────────

pub struct Callbacks {
    pub is_reset_allowed: Box<dyn Fn(&ResetEnumType) -> bool + Send + Sync>,
    pub reset_requested: Box<dyn Fn(ResetEnumType) + Send + Sync>,
    pub unlock_connector: Box<dyn Fn(i32, i32) -> UnlockStatusEnumType + Send + Sync>,
    pub remote_start: Box<dyn Fn(&RequestStartTransactionRequest) -> RequestStartStopStatusEnumType + Send + Sync>,
    pub remote_stop: Box<dyn Fn(&str) -> RequestStartStopStatusEnumType + Send + Sync>,
    pub update_firmware: Box<dyn Fn(&FirmwareType) + Send + Sync>,
}

impl Default for Callbacks {
    fn default() -> Self {
        Self {
            is_reset_allowed: Box::new(|_| true),
            reset_requested: Box::new(|_| {}),
            unlock_connector: Box::new(|_, _| UnlockStatusEnumType::Unlocked),
            remote_start: Box::new(|_| RequestStartStopStatusEnumType::Rejected),
            remote_stop: Box::new(|_| RequestStartStopStatusEnumType::Rejected),
            update_firmware: Box::new(|_| {}),
        }
    }
}

/// What to do when the response for an outbound Call arrives.
pub(crate) enum PendingAck {
    BootNotification,
    TransactionEnded {
        transaction_id: String,
    },
    Authorize {
        token_hash: String,
        respond_to: oneshot::Sender<AuthorizationStatusEnumType>,
    },
}

// ── External handle ────────────────────────────────────────────

/// Cloneable API for the hardware driver; every call becomes an event
/// on the protocol channel.
#[derive(Clone)]
pub struct StationHandle {
    tx: mpsc::Sender<StationEvent>,
}

impl StationHandle {
    async fn push(&self, event: HardwareEvent) {
        if self.tx.send(StationEvent::Hardware(event)).await.is_err() {
            warn!("Protocol task is gone; hardware event dropped");
        }
    }

    pub async fn on_session_started(&self, evse_id: i32, connector_id: i32) {
        self.push(HardwareEvent::SessionStarted {
            evse_id,
            connector_id,
        })
        .await;
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn on_transaction_started(
        &self,
        evse_id: i32,
        connector_id: i32,
        id_token: IdTokenType,
        timestamp: chrono::DateTime<Utc>,
        meter_start_wh: Option<f64>,
        reservation_id: Option<i32>,
        remote_start_id: Option<i32>,
    ) {
        self.push(HardwareEvent::TransactionStarted {
            evse_id,
            connector_id,
            id_token,
            timestamp,
            meter_start_wh,
            reservation_id,
            remote_start_id,
        })
        .await;
    }

    pub async fn on_meter_value(&self, evse_id: i32, meter_value: MeterValueType) {
        self.push(HardwareEvent::MeterValue {
            evse_id,
            meter_value,
        })
        .await;
    }

    pub async fn on_charging_state_changed(
        &self,
        evse_id: i32,
        state: rust_ocpp::v2_0_1::enumerations::charging_state_enum_type::ChargingStateEnumType,
    ) {
        self.push(HardwareEvent::ChargingStateChanged { evse_id, state })
            .await;
    }

    pub async fn on_transaction_finished(
        &self,
        evse_id: i32,
        timestamp: chrono::DateTime<Utc>,
        meter_stop_wh: Option<f64>,
        reason: rust_ocpp::v2_0_1::enumerations::reason_enum_type::ReasonEnumType,
        id_token: Option<IdTokenType>,
    ) {
        self.push(HardwareEvent::TransactionFinished {
            evse_id,
            timestamp,
            meter_stop_wh,
            reason,
            id_token,
        })
        .await;
    }

    pub async fn on_session_finished(&self, evse_id: i32, connector_id: i32) {
        self.push(HardwareEvent::SessionFinished {
            evse_id,
            connector_id,
        })
        .await;
    }

    pub async fn on_network_disconnected(
        &self,
        configuration_slot: Option<i32>,
        interface: Option<String>,
    ) {
        self.push(HardwareEvent::NetworkDisconnected {
            configuration_slot,
            interface,
        })
        .await;
    }

    /// Validate a token against cache, local list, then the CSMS.
    /// Answers `Unknown` when nothing can decide.
    pub async fn authorize(&self, id_token: IdTokenType) -> AuthorizationStatusEnumType {
        let (respond_to, rx) = oneshot::channel();
        if self
            .tx
            .send(StationEvent::Authorize {
                id_token,
                respond_to,
            })
            .await
            .is_err()
        {
            return AuthorizationStatusEnumType::Unknown;
        }
        rx.await.unwrap_or(AuthorizationStatusEnumType::Unknown)
    }

    pub async fn stop(&self) {
        let _ = self.tx.send(StationEvent::Stop).await;
    }
}

// ── ChargePoint ────────────────────────────────────────────────

pub struct ChargePoint {
    pub(crate) config: StationConfig,
    pub(crate) store: SeaOrmStore,
    pub(crate) device_model: DeviceModel,
    pub(crate) queue: MessageQueue,
    pub(crate) connectivity: ConnectivityManager,
    pub(crate) transactions: TransactionManager,
    pub(crate) timers: TimerWheel,
    pub(crate) callbacks: Callbacks,
    pub(crate) registration_status: RegistrationStatusEnumType,
    pub(crate) pending_acks: HashMap<String, PendingAck>,
    /// Meter values seen outside a transaction, flushed as MeterValues
    /// on the aligned tick.
    idle_samples: HashMap<i32, Vec<MeterValueType>>,
    link_rx: mpsc::Receiver<LinkEvent>,
    station_rx: mpsc::Receiver<StationEvent>,
    station_tx: mpsc::Sender<StationEvent>,
    shutdown: ShutdownSignal,
    heartbeat_interval: Duration,
    boot_reason: BootReasonEnumType,
}

enum LoopTurn {
    Link(LinkEvent),
    Station(StationEvent),
    TimersDue,
    Shutdown,
}

impl ChargePoint {
    pub fn new(
        config: StationConfig,
        store: SeaOrmStore,
        callbacks: Callbacks,
    ) -> StationResult<Self> {
        config.validate().map_err(StationError::Config)?;

        let (link_tx, link_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (station_tx, station_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let device_model = DeviceModel::new(store.device_model());
        let queue = MessageQueue::new(
            store.message_queue(),
            QueueConfig {
                message_timeout: Duration::from_secs(config.messaging.message_timeout_s),
                max_attempts: config.messaging.message_max_attempts,
            },
        );
        let transactions =
            TransactionManager::new(store.transactions(), 1..=config.evses.len() as i32);
        let connectivity = ConnectivityManager::new(
            config.station.charge_point_id.clone(),
            config.network.clone(),
            link_tx,
        );
        let heartbeat_interval = Duration::from_secs(config.metering.heartbeat_interval_s);

        Ok(Self {
            config,
            store,
            device_model,
            queue,
            connectivity,
            transactions,
            timers: TimerWheel::new(),
            callbacks,
            registration_status: RegistrationStatusEnumType::Pending,
            pending_acks: HashMap::new(),
            idle_samples: HashMap::new(),
            link_rx,
            station_rx,
            station_tx,
            shutdown: ShutdownSignal::new(),
            heartbeat_interval,
            boot_reason: BootReasonEnumType::PowerUp,
        })
    }

    pub fn handle(&self) -> StationHandle {
        StationHandle {
            tx: self.station_tx.clone(),
        }
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    // ── Boot ───────────────────────────────────────────────

    async fn start(&mut self) -> StationResult<()> {
        info!(
            charge_point_id = self.config.station.charge_point_id.as_str(),
            evses = self.config.evses.len(),
            "Starting charge point"
        );

        self.device_model
            .seed_standard_variables(&self.config)
            .await
            .map_err(StationError::Domain)?;
        self.seed_availability().await?;

        let restored = self.queue.restore().await.map_err(StationError::Domain)?;
        if restored > 0 {
            debug!(restored, "Queue restored");
        }
        self.replay_interrupted_transactions().await?;

        // Allowed past the registration gate, like BootNotification.
        self.security_event_req("StartupOfTheDevice", None).await;

        self.connectivity.start()?;
        Ok(())
    }

    async fn seed_availability(&mut self) -> StationResult<()> {
        let availability = self.store.availability();
        availability
            .insert(ComponentScope::Station, OperationalStatusEnumType::Operative, false)
            .await
            .map_err(StationError::Domain)?;
        for (idx, evse) in self.config.evses.iter().enumerate() {
            let evse_id = idx as i32 + 1;
            availability
                .insert(
                    ComponentScope::Evse(evse_id),
                    OperationalStatusEnumType::Operative,
                    false,
                )
                .await
                .map_err(StationError::Domain)?;
            for connector_id in 1..=evse.connectors as i32 {
                availability
                    .insert(
                        ComponentScope::Connector(evse_id, connector_id),
                        OperationalStatusEnumType::Operative,
                        false,
                    )
                    .await
                    .map_err(StationError::Domain)?;
            }
        }
        Ok(())
    }

    /// Interrupted transactions get one Updated (or Ended) event with
    /// trigger AbnormalCondition and the persisted seq_no + 1.
    async fn replay_interrupted_transactions(&mut self) -> StationResult<()> {
        let adopted = self
            .transactions
            .restore_interrupted()
            .await
            .map_err(StationError::Domain)?;

        for tx in adopted {
            let seq_no = self
                .transactions
                .next_seq_no(tx.evse_id)
                .await
                .map_err(StationError::Domain)?;

            let (event_type, ack) = match tx.stopped_reason {
                // Crashed after finishing but before the ack: replay Ended.
                Some(_) => (
                    TransactionEventEnumType::Ended,
                    Some(PendingAck::TransactionEnded {
                        transaction_id: tx.transaction_id.clone(),
                    }),
                ),
                None => (TransactionEventEnumType::Updated, None),
            };

            let payload = transaction_event_payload(
                event_type,
                &tx,
                TriggerReasonEnumType::AbnormalCondition,
                seq_no,
                Vec::new(),
                true,
            );
            self.enqueue_call(
                "TransactionEvent",
                payload,
                Some(tx.transaction_id.clone()),
                ack,
            )
            .await;
        }
        Ok(())
    }

    // ── Main loop ──────────────────────────────────────────

    pub async fn run(mut self) -> StationResult<()> {
        self.start().await?;

        let shutdown = self.shutdown.clone();
        loop {
            let deadline = self.timers.next_deadline();
            let turn = tokio::select! {
                maybe = self.link_rx.recv() => match maybe {
                    Some(event) => LoopTurn::Link(event),
                    None => LoopTurn::Shutdown,
                },
                maybe = self.station_rx.recv() => match maybe {
                    Some(StationEvent::Stop) | None => LoopTurn::Shutdown,
                    Some(event) => LoopTurn::Station(event),
                },
                _ = sleep_until_opt(deadline) => LoopTurn::TimersDue,
                _ = shutdown.wait() => LoopTurn::Shutdown,
            };

            match turn {
                LoopTurn::Link(event) => self.handle_link_event(event).await,
                LoopTurn::Station(event) => self.handle_station_event(event).await,
                LoopTurn::TimersDue => {
                    for id in self.timers.pop_due(Instant::now()) {
                        self.handle_timer(id).await;
                    }
                }
                LoopTurn::Shutdown => {
                    self.drain_and_close().await;
                    return Ok(());
                }
            }
        }
    }

    async fn drain_and_close(&mut self) {
        let deadline = Instant::now() + Duration::from_secs(self.config.shutdown_grace_s);
        info!(
            grace_s = self.config.shutdown_grace_s,
            "Stopping: draining outbound queue"
        );

        while self.queue.messages_in_queue(None) && Instant::now() < deadline {
            let turn = tokio::select! {
                maybe = self.link_rx.recv() => maybe.map(LoopTurn::Link),
                _ = time::sleep_until(deadline) => None,
            };
            match turn {
                Some(LoopTurn::Link(event)) => self.handle_link_event(event).await,
                _ => break,
            }
        }

        if self.queue.messages_in_queue(None) {
            warn!("Shutdown grace elapsed with messages still queued; they will replay next boot");
        }
        self.connectivity.disconnect(CloseReason::Normal);
        // Let the close frame make it out.
        let _ = time::timeout(Duration::from_millis(250), self.link_rx.recv()).await;
        info!("Charge point stopped");
    }

    // ── Link events ────────────────────────────────────────

    async fn handle_link_event(&mut self, event: LinkEvent) {
        if let LinkEvent::Frame(text) = event {
            self.handle_frame(&text).await;
            return;
        }

        match self.connectivity.handle_link_event(&event) {
            LinkDisposition::Up {
                slot,
                security_profile,
            } => {
                info!(slot, security_profile, "Link is up");
                self.queue.set_link_up(true);
                if self.registration_status != RegistrationStatusEnumType::Accepted {
                    self.boot_notification_req().await;
                }
                self.pump().await;
            }
            LinkDisposition::RetryIn { delay, generation } => {
                self.on_link_lost().await;
                debug!(delay_ms = delay.as_millis() as u64, "Reconnect scheduled");
                self.timers.arm(TimerId::Reconnect { generation }, delay);
            }
            LinkDisposition::Stopped => {
                self.on_link_lost().await;
                warn!("Link closed and automatic reconnects are disabled");
            }
            LinkDisposition::None => {}
        }
    }

    async fn on_link_lost(&mut self) {
        self.timers.cancel_call_timeouts();
        if let Some((message, outcome)) = self.queue.on_link_down().await {
            self.route_resolution(message, outcome).await;
        }
    }

    async fn handle_frame(&mut self, text: &str) {
        match self.queue.on_frame(text).await {
            QueueDisposition::InboundCall {
                unique_id,
                action,
                payload,
            } => {
                debug!(unique_id = unique_id.as_str(), action = action.as_str(), "Inbound call");
                let frame = match handlers::dispatch(self, &action, &payload).await {
                    Ok(response) => OcppFrame::result_response(unique_id, response),
                    Err((code, description)) => {
                        warn!(
                            action = action.as_str(),
                            code = code.as_str(),
                            description = description.as_str(),
                            "Rejecting inbound call"
                        );
                        OcppFrame::error_response(unique_id, code, description)
                    }
                };
                self.send_volatile(frame).await;
            }
            QueueDisposition::Resolved { message, outcome } => {
                self.route_resolution(message, outcome).await;
                self.pump().await;
            }
            QueueDisposition::ProtocolViolation { reply } => {
                self.send_volatile(reply).await;
            }
            QueueDisposition::Ignored => {}
        }
    }

    /// CallResult / CallError replies bypass the queue: they are never
    /// persisted and are only meaningful on the live link.
    async fn send_volatile(&mut self, frame: OcppFrame) {
        if !self.connectivity.send(frame.serialize()).await {
            warn!(unique_id = frame.unique_id(), "Reply dropped: link is down");
        }
    }

    // ── Outbound calls ─────────────────────────────────────

    pub(crate) async fn enqueue_call(
        &mut self,
        action: &str,
        payload: Value,
        transaction_id: Option<String>,
        ack: Option<PendingAck>,
    ) {
        match self.queue.enqueue(action, payload, transaction_id).await {
            Ok(unique_id) => {
                if let Some(ack) = ack {
                    self.pending_acks.insert(unique_id, ack);
                }
                self.pump().await;
            }
            Err(e) => {
                // A transactional message that cannot be persisted is a
                // store-integrity problem; surface it loudly.
                error!(action, error = %e, "Failed to enqueue outbound call");
            }
        }
    }

    async fn pump(&mut self) {
        match self.queue.try_transmit(&self.connectivity).await {
            TransmitOutcome::Sent { unique_id } => {
                let timeout = self.queue.message_timeout();
                self.timers.arm(TimerId::CallTimeout { unique_id }, timeout);
            }
            TransmitOutcome::LinkLost => {
                // The link task reports the loss; reconnect follows there.
            }
            TransmitOutcome::Idle => {}
        }
    }

    async fn boot_notification_req(&mut self) {
        let station = &self.config.station;
        let request = BootNotificationRequest {
            charging_station: ChargingStationType {
                model: station.model.clone(),
                vendor_name: station.vendor.clone(),
                serial_number: station.serial_number.clone(),
                firmware_version: station.firmware_version.clone(),
                ..Default::default()
            },
            reason: self.boot_reason.clone(),
        };
        let payload = match serde_json::to_value(&request) {
            Ok(payload) => payload,
            Err(e) => {
                error!(error = %e, "BootNotification serialization failed");
                return;
            }
        };
        self.enqueue_call(
            "BootNotification",
            payload,
            None,
            Some(PendingAck::BootNotification),
        )
        .await;
    }

    async fn heartbeat_req(&mut self) {
        self.enqueue_call("Heartbeat", json!({}), None, None).await;
    }

    pub(crate) async fn status_notification_req(
        &mut self,
        evse_id: i32,
        connector_id: i32,
        connector_status: ConnectorStatusEnumType,
    ) {
        let request = StatusNotificationRequest {
            timestamp: Utc::now(),
            connector_status,
            evse_id,
            connector_id,
        };
        let payload = match serde_json::to_value(&request) {
            Ok(payload) => payload,
            Err(e) => {
                error!(error = %e, "StatusNotification serialization failed");
                return;
            }
        };
        self.enqueue_call("StatusNotification", payload, None, None).await;
    }

    pub(crate) async fn security_event_req(&mut self, kind: &str, tech_info: Option<String>) {
        let request = SecurityEventNotificationRequest {
            kind: kind.to_string(),
            timestamp: Utc::now(),
            tech_info,
        };
        let payload = match serde_json::to_value(&request) {
            Ok(payload) => payload,
            Err(e) => {
                error!(error = %e, "SecurityEventNotification serialization failed");
                return;
            }
        };
        self.enqueue_call("SecurityEventNotification", payload, None, None)
            .await;
    }

    /// Effective status of a connector for StatusNotification:
    /// operational state overrides occupancy.
    pub(crate) async fn effective_connector_status(
        &mut self,
        evse_id: i32,
        connector_id: i32,
    ) -> ConnectorStatusEnumType {
        let availability = self.store.availability();
        for scope in [
            ComponentScope::Station,
            ComponentScope::Evse(evse_id),
            ComponentScope::Connector(evse_id, connector_id),
        ] {
            match availability.get(scope).await {
                Ok(OperationalStatusEnumType::Inoperative) => {
                    return ConnectorStatusEnumType::Unavailable
                }
                Ok(OperationalStatusEnumType::Operative) => {}
                Err(e) => warn!(error = %e, "Availability lookup failed"),
            }
        }
        self.transactions.connector_status(evse_id)
    }

    pub(crate) async fn notify_all_connector_status(&mut self) {
        for (idx, evse) in self.config.evses.clone().iter().enumerate() {
            let evse_id = idx as i32 + 1;
            for connector_id in 1..=evse.connectors as i32 {
                let status = self.effective_connector_status(evse_id, connector_id).await;
                self.status_notification_req(evse_id, connector_id, status).await;
            }
        }
    }

    // ── Response routing ───────────────────────────────────

    async fn route_resolution(&mut self, message: crate::domain::message_queue::QueuedMessage, outcome: CallOutcome) {
        self.timers.cancel(&TimerId::CallTimeout {
            unique_id: message.unique_id.clone(),
        });

        match self.pending_acks.remove(&message.unique_id) {
            Some(PendingAck::BootNotification) => self.on_boot_response(outcome).await,
            Some(PendingAck::TransactionEnded { transaction_id }) => {
                self.on_ended_ack(&transaction_id, outcome).await;
            }
            Some(PendingAck::Authorize {
                token_hash,
                respond_to,
            }) => {
                self.on_authorize_response(&token_hash, outcome, respond_to)
                    .await;
            }
            None => match outcome {
                CallOutcome::Result(_) => {
                    debug!(
                        action = message.action.as_str(),
                        "Call acknowledged"
                    );
                }
                CallOutcome::Error {
                    code, description, ..
                } => {
                    warn!(
                        action = message.action.as_str(),
                        code = code.as_str(),
                        description = description.as_str(),
                        "CSMS returned an error"
                    );
                }
                CallOutcome::Timeout => {
                    warn!(action = message.action.as_str(), "Call timed out");
                }
                CallOutcome::Transport => {
                    debug!(action = message.action.as_str(), "Call cancelled by link loss");
                }
            },
        }
    }

    async fn on_boot_response(&mut self, outcome: CallOutcome) {
        let response: BootNotificationResponse = match outcome {
            CallOutcome::Result(payload) => match serde_json::from_value(payload) {
                Ok(response) => response,
                Err(e) => {
                    error!(error = %e, "Malformed BootNotificationResponse");
                    self.timers.arm(TimerId::BootRetry, self.heartbeat_interval);
                    return;
                }
            },
            other => {
                warn!(outcome = ?other, "BootNotification not answered, retrying");
                self.timers.arm(TimerId::BootRetry, self.heartbeat_interval);
                return;
            }
        };

        self.registration_status = response.status.clone();
        let interval = if response.interval > 0 {
            Duration::from_secs(response.interval as u64)
        } else {
            self.heartbeat_interval
        };

        match response.status {
            RegistrationStatusEnumType::Accepted => {
                info!(
                    interval_s = interval.as_secs(),
                    current_time = %response.current_time,
                    "Registration accepted"
                );
                self.heartbeat_interval = interval;
                self.queue.set_registration_accepted(true);
                self.timers.arm(TimerId::Heartbeat, self.heartbeat_interval);
                self.arm_aligned_timer().await;
                self.notify_all_connector_status().await;
                self.pump().await;
            }
            status => {
                // Pending/Rejected: the interval is the CSMS-instructed
                // earliest moment to try again.
                warn!(status = ?status, retry_in_s = interval.as_secs(), "Registration not accepted");
                self.queue.set_registration_accepted(false);
                self.timers.arm(TimerId::BootRetry, interval);
            }
        }
    }

    async fn on_ended_ack(&mut self, transaction_id: &str, outcome: CallOutcome) {
        match outcome {
            CallOutcome::Result(_) | CallOutcome::Error { .. } => {
                if let CallOutcome::Error { ref code, .. } = outcome {
                    warn!(
                        transaction_id,
                        code = code.as_str(),
                        "CSMS rejected the Ended event; clearing anyway"
                    );
                }
                if let Err(e) = self.transactions.finalize(transaction_id).await {
                    error!(transaction_id, error = %e, "Failed to clear ended transaction");
                }
                if let Err(e) = self
                    .store
                    .charging_profiles()
                    .delete_for_transaction(transaction_id)
                    .await
                {
                    warn!(transaction_id, error = %e, "Failed to drop Tx profiles");
                }
            }
            CallOutcome::Timeout | CallOutcome::Transport => {
                // Keep the transaction; it replays at the next boot.
                warn!(transaction_id, "Ended event unacknowledged; kept for replay");
            }
        }
    }

    async fn on_authorize_response(
        &mut self,
        token_hash: &str,
        outcome: CallOutcome,
        respond_to: oneshot::Sender<AuthorizationStatusEnumType>,
    ) {
        let status = match outcome {
            CallOutcome::Result(payload) => {
                match serde_json::from_value::<AuthorizeResponse>(payload) {
                    Ok(response) => {
                        let status = response.id_token_info.status.clone();
                        if let Err(e) = self
                            .store
                            .auth_cache()
                            .insert(token_hash, &response.id_token_info)
                            .await
                        {
                            warn!(error = %e, "Could not cache authorization");
                        }
                        self.evict_auth_cache_if_needed().await;
                        status
                    }
                    Err(e) => {
                        error!(error = %e, "Malformed AuthorizeResponse");
                        AuthorizationStatusEnumType::Unknown
                    }
                }
            }
            _ => AuthorizationStatusEnumType::Unknown,
        };
        let _ = respond_to.send(status);
    }

    /// LRU eviction once the cache exceeds the device-model byte cap.
    async fn evict_auth_cache_if_needed(&mut self) {
        let cap = self
            .device_model
            .integer_of("AuthCacheCtrlr", "Storage")
            .await
            .ok()
            .flatten()
            .unwrap_or(self.config.auth.cache_max_bytes as i64);

        let cache = self.store.auth_cache();
        match cache.binary_size().await {
            Ok(size) if size > cap as u64 => {
                let lifetime = self.auth_cache_lifetime().await;
                let _ = cache.delete_expired(lifetime).await;
                if let Ok(size) = cache.binary_size().await {
                    if size > cap as u64 {
                        let _ = cache.delete_oldest(AUTH_CACHE_EVICTION_BATCH).await;
                    }
                }
            }
            _ => {}
        }
    }

    pub(crate) async fn auth_cache_lifetime(&self) -> Option<u64> {
        self.device_model
            .integer_of("AuthCacheCtrlr", "LifeTime")
            .await
            .ok()
            .flatten()
            .map(|v| v as u64)
            .or(Some(self.config.auth.cache_lifetime_s))
    }

    // ── Timers ─────────────────────────────────────────────

    async fn handle_timer(&mut self, id: TimerId) {
        match id {
            TimerId::Heartbeat => {
                if self.registration_status == RegistrationStatusEnumType::Accepted {
                    self.heartbeat_req().await;
                }
                self.timers.arm(TimerId::Heartbeat, self.heartbeat_interval);
            }
            TimerId::BootRetry => {
                if self.registration_status != RegistrationStatusEnumType::Accepted
                    && self.connectivity.is_connected()
                {
                    self.boot_notification_req().await;
                }
            }
            TimerId::AlignedMeterValues => {
                self.emit_aligned_meter_values().await;
                self.arm_aligned_timer().await;
            }
            TimerId::SampledMeterValues { evse_id } => {
                self.emit_sampled_meter_values(evse_id).await;
                self.arm_sampled_timer(evse_id);
            }
            TimerId::Reconnect { generation } => {
                if let Err(e) = self.connectivity.on_reconnect_due(generation) {
                    error!(error = %e, "Reconnect failed to start");
                }
            }
            TimerId::CallTimeout { unique_id } => {
                if let Some((message, outcome)) = self.queue.on_timeout(&unique_id).await {
                    self.route_resolution(message, outcome).await;
                }
                self.pump().await;
            }
        }
    }

    async fn arm_aligned_timer(&mut self) {
        let interval_s = self
            .device_model
            .integer_of("AlignedDataCtrlr", "Interval")
            .await
            .ok()
            .flatten()
            .unwrap_or(self.config.metering.aligned_data_interval_s as i64);
        if interval_s <= 0 {
            return;
        }
        let interval = Duration::from_secs(interval_s as u64);
        self.timers
            .arm(TimerId::AlignedMeterValues, until_next_aligned(Utc::now(), interval));
    }

    fn arm_sampled_timer(&mut self, evse_id: i32) {
        let interval_s = self.config.metering.sampled_data_interval_s;
        if interval_s == 0 {
            return;
        }
        let Some(tx) = self.transactions.active_transaction(evse_id) else {
            return;
        };
        let wait = until_next_session_tick(
            Utc::now(),
            tx.start_time,
            Duration::from_secs(interval_s),
        );
        self.timers
            .arm(TimerId::SampledMeterValues { evse_id }, wait);
    }

    async fn emit_aligned_meter_values(&mut self) {
        // Meter data collected outside transactions goes out as plain
        // MeterValues, per EVSE.
        let idle: Vec<(i32, Vec<MeterValueType>)> = self.idle_samples.drain().collect();
        for (evse_id, meter_value) in idle {
            if meter_value.is_empty() {
                continue;
            }
            let payload = json!({ "evseId": evse_id, "meterValue": meter_value });
            self.enqueue_call("MeterValues", payload, None, None).await;
        }

        for evse_id in 1..=self.config.evses.len() as i32 {
            let Some(tx) = self.transactions.active_transaction(evse_id).cloned() else {
                continue;
            };
            if tx.stopped_reason.is_some() {
                continue;
            }
            let samples = self.transactions.take_pending_samples(evse_id);
            self.transaction_updated_req(&tx, TriggerReasonEnumType::MeterValueClock, samples)
                .await;
        }
    }

    async fn emit_sampled_meter_values(&mut self, evse_id: i32) {
        let Some(tx) = self.transactions.active_transaction(evse_id).cloned() else {
            return;
        };
        if tx.stopped_reason.is_some() {
            return;
        }
        let samples = self.transactions.take_pending_samples(evse_id);
        self.transaction_updated_req(&tx, TriggerReasonEnumType::MeterValuePeriodic, samples)
            .await;
    }

    async fn transaction_updated_req(
        &mut self,
        tx: &Transaction,
        trigger: TriggerReasonEnumType,
        samples: Vec<MeterValueType>,
    ) {
        let seq_no = match self.transactions.next_seq_no(tx.evse_id).await {
            Ok(seq_no) => seq_no,
            Err(e) => {
                error!(error = %e, "Cannot allocate seq_no");
                return;
            }
        };
        let payload = transaction_event_payload(
            TransactionEventEnumType::Updated,
            tx,
            trigger,
            seq_no,
            samples,
            false,
        );
        self.enqueue_call(
            "TransactionEvent",
            payload,
            Some(tx.transaction_id.clone()),
            None,
        )
        .await;
    }

    // ── Hardware events ────────────────────────────────────

    async fn handle_station_event(&mut self, event: StationEvent) {
        match event {
            StationEvent::Hardware(event) => self.handle_hardware_event(event).await,
            StationEvent::Authorize {
                id_token,
                respond_to,
            } => self.authorize(id_token, respond_to).await,
            StationEvent::Stop => unreachable!("Stop is handled by the run loop"),
        }
    }

    async fn handle_hardware_event(&mut self, event: HardwareEvent) {
        match event {
            HardwareEvent::SessionStarted {
                evse_id,
                connector_id,
            } => {
                if let Err(e) = self.transactions.on_session_started(evse_id, connector_id) {
                    warn!(evse_id, error = %e, "Session start rejected");
                    return;
                }
                let status = self.effective_connector_status(evse_id, connector_id).await;
                self.status_notification_req(evse_id, connector_id, status).await;
            }

            HardwareEvent::TransactionStarted {
                evse_id,
                connector_id,
                id_token,
                timestamp,
                meter_start_wh,
                reservation_id,
                remote_start_id,
            } => {
                let tx = match self
                    .transactions
                    .on_transaction_started(
                        evse_id,
                        connector_id,
                        id_token,
                        timestamp,
                        meter_start_wh,
                        reservation_id,
                        remote_start_id,
                    )
                    .await
                {
                    Ok(tx) => tx,
                    Err(e) => {
                        warn!(evse_id, error = %e, "Transaction start rejected");
                        return;
                    }
                };

                let seq_no = match self.transactions.next_seq_no(evse_id).await {
                    Ok(seq_no) => seq_no,
                    Err(e) => {
                        error!(error = %e, "Cannot allocate seq_no");
                        return;
                    }
                };
                let payload = transaction_event_payload(
                    TransactionEventEnumType::Started,
                    &tx,
                    TriggerReasonEnumType::Authorized,
                    seq_no,
                    Vec::new(),
                    false,
                );
                self.enqueue_call(
                    "TransactionEvent",
                    payload,
                    Some(tx.transaction_id.clone()),
                    None,
                )
                .await;
                self.arm_sampled_timer(evse_id);
            }

            HardwareEvent::MeterValue {
                evse_id,
                meter_value,
            } => {
                if self.transactions.active_transaction(evse_id).is_some() {
                    if let Err(e) = self.transactions.on_meter_value(evse_id, meter_value).await {
                        warn!(evse_id, error = %e, "Meter sample not persisted");
                    }
                } else {
                    self.idle_samples.entry(evse_id).or_default().push(meter_value);
                }
            }

            HardwareEvent::ChargingStateChanged { evse_id, state } => {
                match self.transactions.update_charging_state(evse_id, state).await {
                    Ok(Some(tx)) => {
                        let samples = self.transactions.take_pending_samples(evse_id);
                        self.transaction_updated_req(
                            &tx,
                            TriggerReasonEnumType::ChargingStateChanged,
                            samples,
                        )
                        .await;
                    }
                    Ok(None) => {}
                    Err(e) => warn!(evse_id, error = %e, "Charging state change failed"),
                }
            }

            HardwareEvent::TransactionFinished {
                evse_id,
                timestamp: _,
                meter_stop_wh: _,
                reason,
                id_token,
            } => {
                let stop_authorized = id_token.is_some();
                let tx = match self
                    .transactions
                    .on_transaction_finished(evse_id, reason, id_token)
                    .await
                {
                    Ok(tx) => tx,
                    Err(e) => {
                        warn!(evse_id, error = %e, "Transaction finish rejected");
                        return;
                    }
                };

                self.timers.cancel(&TimerId::SampledMeterValues { evse_id });
                let seq_no = match self.transactions.next_seq_no(evse_id).await {
                    Ok(seq_no) => seq_no,
                    Err(e) => {
                        error!(error = %e, "Cannot allocate seq_no");
                        return;
                    }
                };

                let samples = self.transactions.take_pending_samples(evse_id);
                let trigger = if stop_authorized {
                    TriggerReasonEnumType::StopAuthorized
                } else {
                    TriggerReasonEnumType::EVDeparted
                };
                let payload = transaction_event_payload(
                    TransactionEventEnumType::Ended,
                    &tx,
                    trigger,
                    seq_no,
                    samples,
                    false,
                );
                self.enqueue_call(
                    "TransactionEvent",
                    payload,
                    Some(tx.transaction_id.clone()),
                    Some(PendingAck::TransactionEnded {
                        transaction_id: tx.transaction_id.clone(),
                    }),
                )
                .await;
            }

            HardwareEvent::SessionFinished {
                evse_id,
                connector_id,
            } => {
                if let Err(e) = self.transactions.on_session_finished(evse_id, connector_id) {
                    warn!(evse_id, error = %e, "Session finish rejected");
                    return;
                }
                let status = self.effective_connector_status(evse_id, connector_id).await;
                self.status_notification_req(evse_id, connector_id, status).await;
            }

            HardwareEvent::NetworkDisconnected {
                configuration_slot,
                interface,
            } => {
                if self
                    .connectivity
                    .on_network_disconnected(configuration_slot, interface.as_deref())
                {
                    self.queue.set_link_up(false);
                    self.on_link_lost().await;
                }
            }
        }
    }

    /// Token validation chain: auth cache, local list, then the CSMS.
    async fn authorize(
        &mut self,
        id_token: IdTokenType,
        respond_to: oneshot::Sender<AuthorizationStatusEnumType>,
    ) {
        let token_hash = id_token_hash(&id_token);
        let lifetime = self.auth_cache_lifetime().await;

        match self.store.auth_cache().get(&token_hash).await {
            Ok(Some(entry)) if !entry.is_expired(Utc::now(), lifetime) => {
                debug!("Authorization answered from cache");
                let _ = self.store.auth_cache().touch(&token_hash).await;
                let _ = respond_to.send(entry.info.status);
                return;
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Auth cache lookup failed"),
        }

        match self.store.auth_list().get_entry(&id_token).await {
            Ok(Some(info)) => {
                debug!("Authorization answered from local list");
                let _ = respond_to.send(info.status);
                return;
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Auth list lookup failed"),
        }

        if self.registration_status != RegistrationStatusEnumType::Accepted
            || !self.connectivity.is_connected()
        {
            let _ = respond_to.send(AuthorizationStatusEnumType::Unknown);
            return;
        }

        let request = AuthorizeRequest {
            id_token,
            ..Default::default()
        };
        let payload = match serde_json::to_value(&request) {
            Ok(payload) => payload,
            Err(e) => {
                error!(error = %e, "Authorize serialization failed");
                let _ = respond_to.send(AuthorizationStatusEnumType::Unknown);
                return;
            }
        };
        self.enqueue_call(
            "Authorize",
            payload,
            None,
            Some(PendingAck::Authorize {
                token_hash,
                respond_to,
            }),
        )
        .await;
    }
}

// ── Wire payload builders ──────────────────────────────────────

fn transaction_event_payload(
    event_type: TransactionEventEnumType,
    tx: &Transaction,
    trigger_reason: TriggerReasonEnumType,
    seq_no: i32,
    meter_values: Vec<MeterValueType>,
    offline: bool,
) -> Value {
    let request = TransactionEventRequest {
        event_type,
        timestamp: Utc::now(),
        trigger_reason,
        seq_no,
        transaction_info: tx.to_transaction_type(),
        id_token: tx.id_token.clone(),
        evse: Some(EVSEType {
            id: tx.evse_id,
            connector_id: Some(tx.connector_id),
        }),
        meter_value: if meter_values.is_empty() {
            None
        } else {
            Some(meter_values)
        },
        offline: if offline { Some(true) } else { None },
        reservation_id: tx.reservation_id,
        ..Default::default()
    };
    serde_json::to_value(&request).unwrap_or_else(|_| json!({}))
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => time::sleep_until(at).await,
        None => futures::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EvseConfig, NetworkConnectionProfile};
    use crate::infrastructure::database::{init_database, DatabaseConfig};
    use futures::{SinkExt, StreamExt};
    use rust_ocpp::v2_0_1::enumerations::id_token_enum_type::IdTokenEnumType;
    use rust_ocpp::v2_0_1::enumerations::reason_enum_type::ReasonEnumType;
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::handshake::server::{
        Request as HsRequest, Response as HsResponse,
    };
    use tokio_tungstenite::tungstenite::Message;

    /// Minimal in-process CSMS: accepts one station, answers every Call
    /// (BootNotification with Accepted), and forwards received Calls to
    /// the test.
    async fn spawn_fake_csms() -> (u16, mpsc::UnboundedReceiver<(String, Value)>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (calls_tx, calls_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let ws = tokio_tungstenite::accept_hdr_async(
                    stream,
                    |_req: &HsRequest, mut resp: HsResponse| {
                        resp.headers_mut().insert(
                            "Sec-WebSocket-Protocol",
                            "ocpp2.0.1".parse().expect("static header"),
                        );
                        Ok(resp)
                    },
                )
                .await;
                let Ok(ws) = ws else { continue };
                let (mut sink, mut stream) = ws.split();
                let calls_tx = calls_tx.clone();

                while let Some(Ok(message)) = stream.next().await {
                    let Message::Text(text) = message else { continue };
                    let Ok(arr) = serde_json::from_str::<Vec<Value>>(&text) else {
                        continue;
                    };
                    if arr.first().and_then(Value::as_u64) != Some(2) {
                        continue;
                    }
                    let unique_id = arr[1].as_str().unwrap_or_default().to_string();
                    let action = arr[2].as_str().unwrap_or_default().to_string();
                    let payload = arr.get(3).cloned().unwrap_or(Value::Null);

                    let response = match action.as_str() {
                        "BootNotification" => json!({
                            "status": "Accepted",
                            "interval": 30,
                            "currentTime": "2025-01-01T00:00:00Z",
                        }),
                        _ => json!({}),
                    };
                    let reply = json!([3, unique_id, response]).to_string();
                    let _ = sink.send(Message::Text(reply)).await;
                    let _ = calls_tx.send((action, payload));
                }
            }
        });

        (port, calls_rx)
    }

    fn test_config(port: u16) -> StationConfig {
        let mut config = StationConfig::default();
        config.station.charge_point_id = "cp001".into();
        config.evses = vec![EvseConfig { connectors: 1 }];
        config.network.profiles = vec![NetworkConnectionProfile {
            configuration_slot: 0,
            csms_url: format!("127.0.0.1:{}/ocpp", port),
            security_profile: 1,
            interface: None,
            basic_auth_user: Some("cp001".into()),
            basic_auth_password: Some("secretsecret".into()),
            trust_anchor_path: None,
            client_cert_path: None,
            client_key_path: None,
        }];
        config.network.ping_interval_s = 0;
        config.shutdown_grace_s = 1;
        config
    }

    async fn next_action(
        calls: &mut mpsc::UnboundedReceiver<(String, Value)>,
    ) -> (String, Value) {
        tokio::time::timeout(Duration::from_secs(5), calls.recv())
            .await
            .expect("timed out waiting for a call")
            .expect("CSMS channel closed")
    }

    async fn started_station(port: u16) -> StationHandle {
        let db = init_database(&DatabaseConfig::in_memory()).await.unwrap();
        let store = SeaOrmStore::new(db);
        let cp = ChargePoint::new(test_config(port), store, Callbacks::default()).unwrap();
        let handle = cp.handle();
        tokio::spawn(cp.run());
        handle
    }

    #[tokio::test]
    async fn boot_accepted_emits_status_notifications() {
        let (port, mut calls) = spawn_fake_csms().await;
        let handle = started_station(port).await;

        // Startup security event passes the registration gate first.
        let (action, _) = next_action(&mut calls).await;
        assert_eq!(action, "SecurityEventNotification");

        let (action, payload) = next_action(&mut calls).await;
        assert_eq!(action, "BootNotification");
        assert_eq!(payload["reason"], "PowerUp");
        assert_eq!(payload["chargingStation"]["vendorName"], "Texnouz");

        // Accepted: one StatusNotification per connector.
        let (action, payload) = next_action(&mut calls).await;
        assert_eq!(action, "StatusNotification");
        assert_eq!(payload["evseId"], 1);
        assert_eq!(payload["connectorId"], 1);
        assert_eq!(payload["connectorStatus"], "Available");

        handle.stop().await;
    }

    #[tokio::test]
    async fn transaction_events_carry_monotone_seq_nos() {
        let (port, mut calls) = spawn_fake_csms().await;
        let handle = started_station(port).await;

        // Skip the boot conversation.
        loop {
            let (action, _) = next_action(&mut calls).await;
            if action == "StatusNotification" {
                break;
            }
        }

        handle.on_session_started(1, 1).await;
        let (action, payload) = next_action(&mut calls).await;
        assert_eq!(action, "StatusNotification");
        assert_eq!(payload["connectorStatus"], "Occupied");

        let token = IdTokenType {
            id_token: "TAG01".into(),
            kind: IdTokenEnumType::ISO14443,
            additional_info: None,
        };
        handle
            .on_transaction_started(1, 1, token, Utc::now(), Some(0.0), None, None)
            .await;

        let (action, started) = next_action(&mut calls).await;
        assert_eq!(action, "TransactionEvent");
        assert_eq!(started["eventType"], "Started");
        assert_eq!(started["seqNo"], 0);
        let tx_id = started["transactionInfo"]["transactionId"]
            .as_str()
            .expect("transactionId present")
            .to_string();
        assert!(tx_id.starts_with("txn-"));

        handle
            .on_transaction_finished(1, Utc::now(), Some(1000.0), ReasonEnumType::Local, None)
            .await;

        let (action, ended) = next_action(&mut calls).await;
        assert_eq!(action, "TransactionEvent");
        assert_eq!(ended["eventType"], "Ended");
        assert_eq!(ended["seqNo"], 1);
        assert_eq!(ended["transactionInfo"]["transactionId"], tx_id.as_str());

        handle.on_session_finished(1, 1).await;
        let (action, payload) = next_action(&mut calls).await;
        assert_eq!(action, "StatusNotification");
        assert_eq!(payload["connectorStatus"], "Available");

        handle.stop().await;
    }
}

