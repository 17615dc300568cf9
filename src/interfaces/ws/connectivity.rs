//! Connectivity manager
//!
//! Owns the websocket link lifecycle across the prioritized network
//! connection profiles: within-profile exponential backoff, rotation
//! to the next configuration slot once a profile's attempts are used
//! up, an extra delay when the rotation wraps, and forced cycling when
//! the platform reports a network interface down.
//!
//! The manager is passive: the protocol task feeds it `LinkEvent`s and
//! schedules the reconnect timers it asks for, so no timer closure
//! ever captures mutable state.

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{info, warn};

use super::link::{CloseReason, LinkEvent, WebSocketLink};
use super::options::ConnectionOptions;
use crate::config::{NetworkConfig, NetworkConnectionProfile};
use crate::support::backoff::{BackoffConfig, ReconnectBackoff};
use crate::support::errors::StationError;

/// What the protocol task should do after a link event.
#[derive(Debug, PartialEq, Eq)]
pub enum LinkDisposition {
    /// Link is up on the given configuration slot.
    Up { slot: i32, security_profile: u8 },
    /// Schedule a reconnect after the delay, tagged with a generation;
    /// stale timers (older generation) must be ignored.
    RetryIn { delay: Duration, generation: u64 },
    /// Reconnects are disabled; report upward and stop.
    Stopped,
    /// Nothing for the manager; the event is transport payload.
    None,
}

pub struct ConnectivityManager {
    charge_point_id: String,
    network: NetworkConfig,
    priority_index: usize,
    backoff: ReconnectBackoff,
    link: Option<WebSocketLink>,
    link_events: mpsc::Sender<LinkEvent>,
    generation: u64,
    reconnects_disabled: bool,
    connected: bool,
}

impl ConnectivityManager {
    pub fn new(
        charge_point_id: impl Into<String>,
        mut network: NetworkConfig,
        link_events: mpsc::Sender<LinkEvent>,
    ) -> Self {
        network
            .profiles
            .sort_by_key(|p| p.configuration_slot);

        let backoff = ReconnectBackoff::new(BackoffConfig {
            initial: Duration::from_secs(network.retry.initial_retry_s),
            max: Duration::from_secs(network.retry.max_retry_s),
            max_attempts: network.retry.max_attempts_per_profile,
        });

        Self {
            charge_point_id: charge_point_id.into(),
            reconnects_disabled: network.disable_automatic_reconnects,
            network,
            priority_index: 0,
            backoff,
            link: None,
            link_events,
            generation: 0,
            connected: false,
        }
    }

    fn current_profile(&self) -> &NetworkConnectionProfile {
        &self.network.profiles[self.priority_index]
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn current_slot(&self) -> i32 {
        self.current_profile().configuration_slot
    }

    /// Begin at the highest-priority profile.
    pub fn start(&mut self) -> Result<(), StationError> {
        self.priority_index = 0;
        self.backoff.reset();
        self.connect()
    }

    /// Build a fresh link for the current profile. The previous link,
    /// if any, is destroyed first: at most one link exists at a time.
    pub fn connect(&mut self) -> Result<(), StationError> {
        self.link = None;
        self.generation += 1;

        let profile = self.current_profile();
        info!(
            slot = profile.configuration_slot,
            security_profile = profile.security_profile,
            "Connecting network profile"
        );

        let options =
            ConnectionOptions::from_profile(profile, &self.network, &self.charge_point_id)?;
        self.link = Some(WebSocketLink::connect(options, self.link_events.clone()));
        Ok(())
    }

    /// Digest a link event and say what to do next.
    pub fn handle_link_event(&mut self, event: &LinkEvent) -> LinkDisposition {
        match event {
            LinkEvent::Connected { security_profile } => {
                self.connected = true;
                self.backoff.reset();
                LinkDisposition::Up {
                    slot: self.current_slot(),
                    security_profile: *security_profile,
                }
            }
            LinkEvent::Disconnected | LinkEvent::Closed(_) | LinkEvent::Failed(_) => {
                self.connected = false;
                self.link = None;
                if self.reconnects_disabled {
                    return LinkDisposition::Stopped;
                }
                self.schedule_retry()
            }
            LinkEvent::Frame(_) => LinkDisposition::None,
        }
    }

    fn schedule_retry(&mut self) -> LinkDisposition {
        let mut extra = Duration::ZERO;

        if self.backoff.exhausted() {
            let next = (self.priority_index + 1) % self.network.profiles.len();
            let wrapped = next <= self.priority_index;
            if wrapped {
                extra = Duration::from_secs(self.network.retry.profile_cycle_delay_s);
            }
            warn!(
                from_slot = self.current_slot(),
                to_slot = self.network.profiles[next].configuration_slot,
                wrapped,
                "Profile attempts exhausted, rotating"
            );
            self.priority_index = next;
            self.backoff.reset();
        }

        self.generation += 1;
        LinkDisposition::RetryIn {
            delay: self.backoff.next_delay() + extra,
            generation: self.generation,
        }
    }

    /// A reconnect timer fired. Stale generations are ignored (the
    /// manager moved on, e.g. options were replaced meanwhile).
    pub fn on_reconnect_due(&mut self, generation: u64) -> Result<(), StationError> {
        if generation != self.generation || self.reconnects_disabled || self.link.is_some() {
            return Ok(());
        }
        self.connect()
    }

    /// The platform says a network went down. If it backs the current
    /// profile, drop the link immediately instead of waiting for the
    /// socket to time out; returns true when that happened.
    pub fn on_network_disconnected(
        &mut self,
        configuration_slot: Option<i32>,
        interface: Option<&str>,
    ) -> bool {
        let profile = self.current_profile();
        let slot_matches = configuration_slot == Some(profile.configuration_slot);
        let iface_matches = match (interface, &profile.interface) {
            (Some(down), Some(own)) => down == own,
            _ => false,
        };
        if !slot_matches && !iface_matches {
            return false;
        }

        warn!(
            slot = profile.configuration_slot,
            "Network behind the active profile went down, dropping link"
        );
        if let Some(link) = &self.link {
            link.close(CloseReason::AbnormalClose);
        }
        self.link = None;
        self.connected = false;
        true
    }

    /// Clean close; never reconnects afterwards.
    pub fn disconnect(&mut self, reason: CloseReason) {
        self.reconnects_disabled = true;
        if let Some(link) = &self.link {
            link.close(reason);
        }
    }

    /// Replace runtime options. The old link is destroyed before a new
    /// one is built; with `reconnect = false` the caller reconnects
    /// later on its own schedule.
    pub fn set_connection_options(
        &mut self,
        mut network: NetworkConfig,
        reconnect: bool,
    ) -> Result<(), StationError> {
        network.profiles.sort_by_key(|p| p.configuration_slot);
        self.reconnects_disabled = network.disable_automatic_reconnects;
        self.backoff = ReconnectBackoff::new(BackoffConfig {
            initial: Duration::from_secs(network.retry.initial_retry_s),
            max: Duration::from_secs(network.retry.max_retry_s),
            max_attempts: network.retry.max_attempts_per_profile,
        });
        self.network = network;
        self.priority_index = 0;
        self.link = None;
        self.connected = false;
        self.generation += 1;

        if reconnect {
            self.connect()
        } else {
            Ok(())
        }
    }

    /// Send a text frame over the live link.
    pub async fn send(&self, text: String) -> bool {
        match &self.link {
            Some(link) => link.send(text).await,
            None => false,
        }
    }
}
