// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent registry: last-known agent state, operator intent, and
//! request/report correlation.
//!
//! [`AgentRegistry`] is the only entry point. It is constructed once at
//! startup and shared (`Arc`) between the HTTP surface and the connection
//! layer.

pub mod deliver;
pub mod notify;
pub mod store;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

pub use deliver::{Command, Deliver, DeliveryError};
pub use notify::{NotifyBroker, WaitResult, WaitToken};
pub use store::{AgentStore, ReportMerge};
pub use types::{
    AgentConfigFile, AgentConfigMap, AgentRecord, ConnectionSettingsOffer, InstanceId,
    ReportedState, TlsCertificate,
};

/// Tunables for [`AgentRegistry`].
#[derive(Debug, Clone, Copy)]
pub struct RegistryOptions {
    /// Upper bound on how long a config push waits for the next report.
    pub ack_timeout: Duration,
    pub report_merge: ReportMerge,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self { ack_timeout: Duration::from_secs(5), report_merge: ReportMerge::Replace }
    }
}

/// Terminal outcome of a config push to a known agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PushOutcome {
    Acknowledged,
    TimedOut,
}

/// Terminal outcome of a connection-settings offer to a known agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferOutcome {
    Delivered,
}

/// Failures surfaced by registry operations. None of them poison the
/// registry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("unknown agent {0}")]
    UnknownAgent(InstanceId),
    #[error("failed to deliver to agent {id}: {source}")]
    DeliveryFailed { id: InstanceId, source: DeliveryError },
}

/// Shared agent registry.
pub struct AgentRegistry {
    store: AgentStore,
    broker: NotifyBroker,
    deliver: Arc<dyn Deliver>,
    ack_timeout: Duration,
}

impl AgentRegistry {
    pub fn new(options: RegistryOptions, deliver: Arc<dyn Deliver>) -> Self {
        Self {
            store: AgentStore::new(options.report_merge),
            broker: NotifyBroker::new(),
            deliver,
            ack_timeout: options.ack_timeout,
        }
    }

    pub fn ack_timeout(&self) -> Duration {
        self.ack_timeout
    }

    pub fn list_agents(&self) -> Vec<AgentRecord> {
        self.store.get_all()
    }

    pub fn get_agent(&self, id: &InstanceId) -> Option<AgentRecord> {
        self.store.get(id)
    }

    pub fn agent_count(&self) -> usize {
        self.store.len()
    }

    /// Record an inbound report, then wake everyone waiting on it.
    ///
    /// Returns `true` when this was the first report from `id`.
    pub fn on_report(&self, id: InstanceId, reported_state: ReportedState) -> bool {
        let created = self.store.upsert_from_report(id, reported_state);
        let notified = self.broker.fire(&id);
        if created {
            tracing::info!(instance_id = %id, "agent registered");
        }
        if notified > 0 {
            tracing::debug!(instance_id = %id, notified, "report woke waiters");
        }
        created
    }

    /// Assign `config` to the agent and wait up to `timeout` for its next
    /// report.
    ///
    /// The wait is registered before the config is dispatched so a fast
    /// report cannot slip past. `timeout` bounds the hand-off and the wait
    /// together. The assignment is not rolled back on timeout, delivery
    /// failure, or cancellation.
    pub async fn push_custom_config(
        &self,
        id: InstanceId,
        config: AgentConfigMap,
        timeout: Duration,
    ) -> Result<PushOutcome, RegistryError> {
        if !self.store.contains(&id) {
            return Err(RegistryError::UnknownAgent(id));
        }

        let token = self.broker.register(id);
        let deadline = token.created_at() + timeout;
        let command = Command::RemoteConfig(config.clone());
        if !self.store.apply_mutation(&id, |record| record.pending_config = Some(config)) {
            return Err(RegistryError::UnknownAgent(id));
        }
        match tokio::time::timeout_at(deadline, self.dispatch(id, command)).await {
            Ok(delivered) => delivered?,
            Err(_) => {
                tracing::warn!(instance_id = %id, "config hand-off missed the deadline");
                return Ok(PushOutcome::TimedOut);
            }
        }

        let outcome = match token.wait(timeout).await {
            WaitResult::Notified => PushOutcome::Acknowledged,
            WaitResult::TimedOut => PushOutcome::TimedOut,
            WaitResult::Closed => {
                tracing::debug!(instance_id = %id, "registry closed while awaiting report");
                PushOutcome::TimedOut
            }
        };
        tracing::info!(instance_id = %id, ?outcome, "config push finished");
        Ok(outcome)
    }

    /// [`push_custom_config`](Self::push_custom_config) with the configured
    /// acknowledgment timeout.
    pub async fn push_custom_config_default(
        &self,
        id: InstanceId,
        config: AgentConfigMap,
    ) -> Result<PushOutcome, RegistryError> {
        self.push_custom_config(id, config, self.ack_timeout).await
    }

    /// Offer new connection settings. Does not wait for the agent to act on
    /// them.
    ///
    /// The offer replaces any undelivered one. While the hand-off runs the
    /// offer is held by this call, not the record, so a concurrent
    /// [`redeliver_pending`](Self::redeliver_pending) cannot send it again.
    /// It is stored as pending only if the hand-off fails.
    pub async fn offer_connection_settings(
        &self,
        id: InstanceId,
        offer: ConnectionSettingsOffer,
    ) -> Result<OfferOutcome, RegistryError> {
        let superseded = self
            .store
            .update(&id, |record| record.pending_connection_offer.take())
            .ok_or(RegistryError::UnknownAgent(id))?;
        if superseded.is_some() {
            tracing::debug!(instance_id = %id, "undelivered offer superseded");
        }
        self.hand_off_offer(id, offer).await?;
        Ok(OfferOutcome::Delivered)
    }

    /// Start watching for the next report from a known agent.
    ///
    /// Take the token before triggering whatever should make the agent
    /// report, then [`wait`](WaitToken::wait) on it.
    pub fn watch_next_report(&self, id: InstanceId) -> Result<WaitToken, RegistryError> {
        if !self.store.contains(&id) {
            return Err(RegistryError::UnknownAgent(id));
        }
        Ok(self.broker.register(id))
    }

    /// Re-send intent the agent has not picked up yet: the pending config when
    /// `applied_config_hash` differs from it, and any undelivered offer.
    ///
    /// Returns the number of commands handed off. Each hand-off is bounded by
    /// the acknowledgment timeout.
    pub async fn redeliver_pending(
        &self,
        id: InstanceId,
        applied_config_hash: Option<&str>,
    ) -> Result<usize, RegistryError> {
        let config = self
            .store
            .update(&id, |record| record.pending_config.clone())
            .ok_or(RegistryError::UnknownAgent(id))?;
        let mut sent = 0;

        if let Some(config) = config {
            if applied_config_hash != Some(config.config_hash().as_str()) {
                self.dispatch_bounded(id, Command::RemoteConfig(config)).await?;
                sent += 1;
            }
        }
        let offer = self.store.update(&id, |record| record.pending_connection_offer.take()).flatten();
        if let Some(offer) = offer {
            self.hand_off_offer(id, offer).await?;
            sent += 1;
        }
        Ok(sent)
    }

    /// Release every outstanding wait. Used on shutdown.
    pub fn shutdown(&self) {
        self.broker.close();
    }

    #[cfg(test)]
    pub(crate) fn pending_waiters(&self, id: &InstanceId) -> usize {
        self.broker.pending(id)
    }

    async fn dispatch(&self, id: InstanceId, command: Command) -> Result<(), RegistryError> {
        let kind = command.kind();
        match self.deliver.deliver(id, command).await {
            Ok(()) => {
                tracing::debug!(instance_id = %id, kind, "command delivered");
                Ok(())
            }
            Err(source) => {
                tracing::warn!(instance_id = %id, kind, err = %source, "command delivery failed");
                Err(RegistryError::DeliveryFailed { id, source })
            }
        }
    }

    /// [`dispatch`](Self::dispatch) limited to the acknowledgment timeout. A
    /// hand-off that does not finish in time counts as a backlogged agent.
    async fn dispatch_bounded(&self, id: InstanceId, command: Command) -> Result<(), RegistryError> {
        let kind = command.kind();
        match tokio::time::timeout(self.ack_timeout, self.dispatch(id, command)).await {
            Ok(delivered) => delivered,
            Err(_) => {
                tracing::warn!(instance_id = %id, kind, "command hand-off missed the deadline");
                Err(RegistryError::DeliveryFailed { id, source: DeliveryError::Backlogged })
            }
        }
    }

    /// Send an offer this call holds. On failure it goes back to the record
    /// unless a newer offer was stored meanwhile.
    async fn hand_off_offer(
        &self,
        id: InstanceId,
        offer: ConnectionSettingsOffer,
    ) -> Result<(), RegistryError> {
        let result = self.dispatch_bounded(id, Command::ConnectionSettings(offer.clone())).await;
        if result.is_err() {
            self.store.apply_mutation(&id, |record| {
                let newer_stored = record
                    .pending_connection_offer
                    .as_ref()
                    .is_some_and(|pending| pending.issued_at_ms > offer.issued_at_ms);
                if !newer_stored {
                    record.pending_connection_offer = Some(offer);
                }
            });
        }
        result
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
