//! Ordered, single-consumer buffer of lifecycle notifications.
//!
//! Producers append under one lock, which fixes both the sequence number and the position in
//! the buffer; `drain` swaps the whole buffer out under the same lock.

use crate::context::Context;
use crate::logger::NOTIFICATIONS_TARGET;
use crate::stats::Clock;
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    ClientRegistryUpdated,
    EntityRegistryUpdated,
    CacheAdded,
    CacheRemoved,
    EhcacheServerStoreCreated,
    EhcacheServerStoreDestroyed,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationKind::ClientRegistryUpdated => "CLIENT_REGISTRY_UPDATED",
            NotificationKind::EntityRegistryUpdated => "ENTITY_REGISTRY_UPDATED",
            NotificationKind::CacheAdded => "CACHE_ADDED",
            NotificationKind::CacheRemoved => "CACHE_REMOVED",
            NotificationKind::EhcacheServerStoreCreated => "EHCACHE_SERVER_STORE_CREATED",
            NotificationKind::EhcacheServerStoreDestroyed => "EHCACHE_SERVER_STORE_DESTROYED",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NotificationEvent {
    pub seq: u64,
    pub timestamp: u64,
    pub kind: NotificationKind,
    pub context: Context,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelState {
    Empty,
    Pending,
}

#[derive(Default)]
struct Pending {
    events: Option<Vec<NotificationEvent>>,
    last_seq: u64,
}

pub struct NotificationChannel {
    pending: Mutex<Pending>,
    notify: Notify,
    warn_threshold: usize,
    clock: Arc<dyn Clock>,
}

impl NotificationChannel {
    pub fn new(warn_threshold: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            pending: Mutex::new(Pending::default()),
            notify: Notify::new(),
            warn_threshold: warn_threshold.max(1),
            clock,
        }
    }

    /// Append an event at the tail. Never blocks on the consumer and never fails.
    pub fn emit(&self, kind: NotificationKind, context: Context) -> u64 {
        let timestamp = self.clock.now_millis();
        let (seq, len) = {
            let mut p = self.pending.lock();
            p.last_seq += 1;
            let seq = p.last_seq;
            let events = p.events.get_or_insert_with(Vec::new);
            events.push(NotificationEvent { seq, timestamp, kind, context });
            (seq, events.len())
        };
        log::debug!(target: NOTIFICATIONS_TARGET, "#{seq} {kind}");
        if len % self.warn_threshold == 0 {
            log::warn!(
                target: NOTIFICATIONS_TARGET,
                "{len} notifications pending without a drain; is the consumer alive?"
            );
        }
        self.notify.notify_waiters();
        seq
    }

    /// Take every pending event in production order and reset to empty, in one step.
    pub fn drain(&self) -> Vec<NotificationEvent> {
        self.pending.lock().events.take().unwrap_or_default()
    }

    /// Pending events without consuming them; `None` when nothing is pending.
    pub fn peek(&self) -> Option<Vec<NotificationEvent>> {
        self.pending.lock().events.clone()
    }

    pub fn state(&self) -> ChannelState {
        if self.pending.lock().events.is_some() {
            ChannelState::Pending
        } else {
            ChannelState::Empty
        }
    }

    pub fn len(&self) -> usize {
        self.pending.lock().events.as_ref().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.state() == ChannelState::Empty
    }

    /// Resolve once at least one event is pending.
    pub async fn wait_for_pending(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if !self.is_empty() {
                return;
            }
            notified.await;
        }
    }
}
