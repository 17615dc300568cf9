//! Transaction manager
//!
//! Per-EVSE session and transaction lifecycle. Sequence numbers are
//! persisted inside the accessor, before the corresponding event is
//! enqueued, so a crash duplicates at most one seq_no at the CSMS and
//! never skips one. Ended transactions stay in the store until their
//! Ended event is acknowledged; whatever is still present at boot was
//! interrupted and gets replayed.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_ocpp::v2_0_1::datatypes::id_token_type::IdTokenType;
use rust_ocpp::v2_0_1::datatypes::meter_value_type::MeterValueType;
use rust_ocpp::v2_0_1::enumerations::charging_state_enum_type::ChargingStateEnumType;
use rust_ocpp::v2_0_1::enumerations::connector_status_enum_type::ConnectorStatusEnumType;
use rust_ocpp::v2_0_1::enumerations::reason_enum_type::ReasonEnumType;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::transaction::{Transaction, TransactionRepository};
use crate::support::errors::{DomainError, DomainResult};

struct Session {
    connector_id: i32,
}

struct EvseState {
    session: Option<Session>,
    transaction: Option<Transaction>,
    /// Meter values accumulated since the last Updated event.
    pending_samples: Vec<MeterValueType>,
}

pub struct TransactionManager {
    repo: Arc<dyn TransactionRepository>,
    evses: BTreeMap<i32, EvseState>,
    /// Ended transactions whose Ended event awaits its CallResult,
    /// keyed by transaction id.
    awaiting_ack: HashMap<String, i32>,
}

impl TransactionManager {
    pub fn new(repo: Arc<dyn TransactionRepository>, evse_ids: impl IntoIterator<Item = i32>) -> Self {
        let evses = evse_ids
            .into_iter()
            .map(|id| {
                (
                    id,
                    EvseState {
                        session: None,
                        transaction: None,
                        pending_samples: Vec::new(),
                    },
                )
            })
            .collect();
        Self {
            repo,
            evses,
            awaiting_ack: HashMap::new(),
        }
    }

    fn evse(&mut self, evse_id: i32) -> DomainResult<&mut EvseState> {
        self.evses.get_mut(&evse_id).ok_or(DomainError::NotFound {
            entity: "EVSE",
            field: "evse_id",
            value: evse_id.to_string(),
        })
    }

    /// Transactions found in the store at boot. They are re-adopted as
    /// active (their EVSE is occupied again) and their seq_no resumes
    /// one past the last persisted value.
    pub async fn restore_interrupted(&mut self) -> DomainResult<Vec<Transaction>> {
        let interrupted = self.repo.list_interrupted().await?;
        let mut adopted = Vec::new();

        for mut tx in interrupted {
            let Some(state) = self.evses.get_mut(&tx.evse_id) else {
                warn!(
                    transaction_id = tx.transaction_id.as_str(),
                    evse_id = tx.evse_id,
                    "Interrupted transaction references unknown EVSE, dropping"
                );
                self.repo.delete(&tx.transaction_id).await?;
                continue;
            };

            info!(
                transaction_id = tx.transaction_id.as_str(),
                evse_id = tx.evse_id,
                seq_no = tx.seq_no,
                "Adopting interrupted transaction"
            );
            tx.seq_no += 1;
            state.session = Some(Session {
                connector_id: tx.connector_id,
            });
            state.transaction = Some(tx.clone());
            adopted.push(tx);
        }
        Ok(adopted)
    }

    // ── Session lifecycle ──────────────────────────────────

    pub fn on_session_started(&mut self, evse_id: i32, connector_id: i32) -> DomainResult<()> {
        let state = self.evse(evse_id)?;
        if state.session.is_some() {
            return Err(DomainError::InvalidState(format!(
                "EVSE {} already has a session",
                evse_id
            )));
        }
        debug!(evse_id, connector_id, "Session started");
        state.session = Some(Session { connector_id });
        Ok(())
    }

    pub fn on_session_finished(&mut self, evse_id: i32, _connector_id: i32) -> DomainResult<()> {
        let state = self.evse(evse_id)?;
        // A terminal transaction may still sit here awaiting its ack;
        // only a running one blocks session teardown.
        let still_running = state
            .transaction
            .as_ref()
            .map_or(false, |t| t.stopped_reason.is_none());
        if still_running {
            return Err(DomainError::InvalidState(format!(
                "EVSE {} still has an active transaction",
                evse_id
            )));
        }
        debug!(evse_id, "Session finished");
        state.session = None;
        state.pending_samples.clear();
        Ok(())
    }

    pub fn connector_status(&self, evse_id: i32) -> ConnectorStatusEnumType {
        match self.evses.get(&evse_id) {
            Some(state) if state.session.is_some() => ConnectorStatusEnumType::Occupied,
            _ => ConnectorStatusEnumType::Available,
        }
    }

    // ── Transaction lifecycle ──────────────────────────────

    /// Create and persist a new transaction. At most one transaction
    /// runs per EVSE, and a session must exist.
    #[allow(clippy::too_many_arguments)]
    pub async fn on_transaction_started(
        &mut self,
        evse_id: i32,
        connector_id: i32,
        id_token: IdTokenType,
        timestamp: DateTime<Utc>,
        meter_start_wh: Option<f64>,
        reservation_id: Option<i32>,
        remote_start_id: Option<i32>,
    ) -> DomainResult<Transaction> {
        let state = self.evse(evse_id)?;
        if state.session.is_none() {
            return Err(DomainError::InvalidState(format!(
                "EVSE {} has no session",
                evse_id
            )));
        }
        if state.transaction.is_some() {
            return Err(DomainError::InvalidState(format!(
                "EVSE {} already has an active transaction",
                evse_id
            )));
        }

        let tx = Transaction {
            transaction_id: format!("txn-{}", Uuid::new_v4()),
            evse_id,
            connector_id,
            start_time: timestamp,
            seq_no: 0,
            charging_state: ChargingStateEnumType::EVConnected,
            id_token: Some(id_token),
            group_id_token: None,
            reservation_id,
            remote_start_id,
            active_energy_import_start_value: meter_start_wh,
            stopped_reason: None,
        };

        self.repo.insert(&tx).await?;
        info!(
            transaction_id = tx.transaction_id.as_str(),
            evse_id, "Transaction started"
        );

        let state = self.evse(evse_id)?;
        state.transaction = Some(tx.clone());
        Ok(tx)
    }

    /// Return-and-increment the sequence number, persisting the used
    /// value before it leaves this method.
    pub async fn next_seq_no(&mut self, evse_id: i32) -> DomainResult<i32> {
        let state = self.evse(evse_id)?;
        let Some(tx) = state.transaction.as_mut() else {
            return Err(DomainError::NoActiveTransaction(evse_id));
        };
        let used = tx.seq_no;
        let transaction_id = tx.transaction_id.clone();
        tx.seq_no += 1;
        self.repo.update_seq_no(&transaction_id, used).await?;
        Ok(used)
    }

    pub fn active_transaction(&self, evse_id: i32) -> Option<&Transaction> {
        self.evses.get(&evse_id).and_then(|s| s.transaction.as_ref())
    }

    pub fn evse_of_transaction(&self, transaction_id: &str) -> Option<i32> {
        self.evses
            .iter()
            .find(|(_, s)| {
                s.transaction
                    .as_ref()
                    .map_or(false, |t| t.transaction_id == transaction_id)
            })
            .map(|(id, _)| *id)
    }

    /// Attach a meter value to the running transaction: persisted as a
    /// sample and buffered for the next Updated event.
    pub async fn on_meter_value(
        &mut self,
        evse_id: i32,
        meter_value: MeterValueType,
    ) -> DomainResult<()> {
        let state = self.evse(evse_id)?;
        let Some(tx) = state.transaction.as_ref() else {
            return Err(DomainError::NoActiveTransaction(evse_id));
        };
        let transaction_id = tx.transaction_id.clone();
        self.repo
            .append_meter_sample(&transaction_id, &meter_value)
            .await?;
        self.evse(evse_id)?.pending_samples.push(meter_value);
        Ok(())
    }

    /// Drain the meter values accumulated since the last event.
    pub fn take_pending_samples(&mut self, evse_id: i32) -> Vec<MeterValueType> {
        self.evses
            .get_mut(&evse_id)
            .map(|s| std::mem::take(&mut s.pending_samples))
            .unwrap_or_default()
    }

    pub async fn update_charging_state(
        &mut self,
        evse_id: i32,
        charging_state: ChargingStateEnumType,
    ) -> DomainResult<Option<Transaction>> {
        let state = self.evse(evse_id)?;
        let Some(tx) = state.transaction.as_mut() else {
            return Ok(None);
        };
        if tx.charging_state == charging_state {
            return Ok(None);
        }
        tx.charging_state = charging_state.clone();
        let snapshot = tx.clone();
        self.repo
            .update_charging_state(&snapshot.transaction_id, charging_state)
            .await?;
        Ok(Some(snapshot))
    }

    /// Mark the transaction terminal. It stays persisted (and keyed in
    /// `awaiting_ack`) until `finalize` is called with the CSMS ack of
    /// the Ended event.
    pub async fn on_transaction_finished(
        &mut self,
        evse_id: i32,
        reason: ReasonEnumType,
        id_token: Option<IdTokenType>,
    ) -> DomainResult<Transaction> {
        let state = self.evse(evse_id)?;
        let Some(mut tx) = state.transaction.take() else {
            return Err(DomainError::NoActiveTransaction(evse_id));
        };

        tx.stopped_reason = Some(reason.clone());
        if id_token.is_some() {
            tx.id_token = id_token;
        }
        self.repo
            .update_stopped_reason(&tx.transaction_id, reason)
            .await?;

        info!(
            transaction_id = tx.transaction_id.as_str(),
            evse_id, "Transaction finished"
        );
        self.awaiting_ack.insert(tx.transaction_id.clone(), evse_id);

        // Keep it addressable for seq_no until the ack arrives.
        let state = self.evse(evse_id)?;
        state.transaction = Some(tx.clone());
        Ok(tx)
    }

    pub fn is_awaiting_ack(&self, transaction_id: &str) -> bool {
        self.awaiting_ack.contains_key(transaction_id)
    }

    /// The Ended event was acknowledged: forget the transaction and
    /// its samples.
    pub async fn finalize(&mut self, transaction_id: &str) -> DomainResult<()> {
        let Some(evse_id) = self.awaiting_ack.remove(transaction_id) else {
            return Ok(());
        };

        if let Some(state) = self.evses.get_mut(&evse_id) {
            let matches = state
                .transaction
                .as_ref()
                .map_or(false, |t| t.transaction_id == transaction_id);
            if matches {
                state.transaction = None;
                state.pending_samples.clear();
            }
        }

        self.repo.clear_meter_samples(transaction_id).await?;
        self.repo.delete(transaction_id).await?;
        info!(transaction_id, "Transaction acknowledged and cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database::repositories::SeaOrmTransactionRepository;
    use crate::infrastructure::database::{init_database, DatabaseConfig};
    use rust_ocpp::v2_0_1::enumerations::id_token_enum_type::IdTokenEnumType;

    async fn repo() -> Arc<SeaOrmTransactionRepository> {
        let db = init_database(&DatabaseConfig::in_memory()).await.unwrap();
        Arc::new(SeaOrmTransactionRepository::new(db))
    }

    fn token(value: &str) -> IdTokenType {
        IdTokenType {
            id_token: value.to_string(),
            kind: IdTokenEnumType::ISO14443,
            additional_info: None,
        }
    }

    async fn start_tx(mgr: &mut TransactionManager, evse_id: i32) -> Transaction {
        mgr.on_session_started(evse_id, 1).unwrap();
        mgr.on_transaction_started(evse_id, 1, token("TAG01"), Utc::now(), Some(0.0), None, None)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn transaction_requires_session() {
        let mut mgr = TransactionManager::new(repo().await, [1]);
        let err = mgr
            .on_transaction_started(1, 1, token("TAG01"), Utc::now(), None, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidState(_)));
    }

    #[tokio::test]
    async fn one_transaction_per_evse() {
        let mut mgr = TransactionManager::new(repo().await, [1]);
        let _ = start_tx(&mut mgr, 1).await;
        let err = mgr
            .on_transaction_started(1, 1, token("TAG02"), Utc::now(), None, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidState(_)));
    }

    #[tokio::test]
    async fn seq_no_is_strictly_monotone() {
        let mut mgr = TransactionManager::new(repo().await, [1]);
        let _ = start_tx(&mut mgr, 1).await;
        assert_eq!(mgr.next_seq_no(1).await.unwrap(), 0);
        assert_eq!(mgr.next_seq_no(1).await.unwrap(), 1);
        assert_eq!(mgr.next_seq_no(1).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn restart_resumes_one_past_persisted_seq_no() {
        let repo = repo().await;
        let tx_id;
        {
            let mut mgr = TransactionManager::new(repo.clone(), [1]);
            let tx = start_tx(&mut mgr, 1).await;
            tx_id = tx.transaction_id.clone();
            // Emit 0, 1, 2; persisted high-water mark is 2.
            for _ in 0..3 {
                mgr.next_seq_no(1).await.unwrap();
            }
        }

        // "Reboot".
        let mut mgr = TransactionManager::new(repo, [1]);
        let adopted = mgr.restore_interrupted().await.unwrap();
        assert_eq!(adopted.len(), 1);
        assert_eq!(adopted[0].transaction_id, tx_id);
        assert_eq!(adopted[0].seq_no, 3);
        assert_eq!(mgr.next_seq_no(1).await.unwrap(), 3);
        assert_eq!(mgr.connector_status(1), ConnectorStatusEnumType::Occupied);
    }

    #[tokio::test]
    async fn finished_transaction_waits_for_ack() {
        let mut mgr = TransactionManager::new(repo().await, [1]);
        let tx = start_tx(&mut mgr, 1).await;
        let id = tx.transaction_id.clone();

        let ended = mgr
            .on_transaction_finished(1, ReasonEnumType::Local, None)
            .await
            .unwrap();
        assert_eq!(ended.stopped_reason, Some(ReasonEnumType::Local));
        assert!(mgr.is_awaiting_ack(&id));

        // Still persisted: a crash now must replay it.
        assert_eq!(mgr.repo.list_interrupted().await.unwrap().len(), 1);

        mgr.finalize(&id).await.unwrap();
        assert!(!mgr.is_awaiting_ack(&id));
        assert!(mgr.active_transaction(1).is_none());
        assert!(mgr.repo.list_interrupted().await.unwrap().is_empty());

        // Session can now wind down.
        mgr.on_session_finished(1, 1).unwrap();
        assert_eq!(mgr.connector_status(1), ConnectorStatusEnumType::Available);
    }

    #[tokio::test]
    async fn meter_values_accumulate_until_drained() {
        let mut mgr = TransactionManager::new(repo().await, [1]);
        let _ = start_tx(&mut mgr, 1).await;

        let mv = MeterValueType {
            timestamp: Utc::now(),
            sampled_value: vec![],
        };
        mgr.on_meter_value(1, mv.clone()).await.unwrap();
        mgr.on_meter_value(1, mv).await.unwrap();

        assert_eq!(mgr.take_pending_samples(1).len(), 2);
        assert!(mgr.take_pending_samples(1).is_empty());
    }

    #[tokio::test]
    async fn charging_state_change_is_persisted_once() {
        let mut mgr = TransactionManager::new(repo().await, [1]);
        let _ = start_tx(&mut mgr, 1).await;

        let changed = mgr
            .update_charging_state(1, ChargingStateEnumType::Charging)
            .await
            .unwrap();
        assert!(changed.is_some());

        // Same state again is a no-op.
        let unchanged = mgr
            .update_charging_state(1, ChargingStateEnumType::Charging)
            .await
            .unwrap();
        assert!(unchanged.is_none());
    }
}
