// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One-shot "next report" notifications keyed by instance id.
//!
//! A caller registers a [`WaitToken`] before dispatching a command, then
//! awaits it. The connection layer fires the instance after every report,
//! which completes every token registered up to that point. Dropping a token
//! removes its registration, so timed-out or cancelled waits leave nothing
//! behind.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::Instant;

use super::types::InstanceId;

/// Outcome of waiting on a [`WaitToken`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitResult {
    /// A report arrived after registration.
    Notified,
    /// The deadline passed first.
    TimedOut,
    /// The broker was closed (process shutdown).
    Closed,
}

#[derive(Default)]
struct Waiters {
    by_instance: HashMap<InstanceId, Vec<(u64, oneshot::Sender<()>)>>,
    closed: bool,
}

#[derive(Default)]
struct BrokerInner {
    waiters: Mutex<Waiters>,
    next_key: AtomicU64,
}

/// Per-instance fan-out of one-shot report notifications.
#[derive(Clone, Default)]
pub struct NotifyBroker {
    inner: Arc<BrokerInner>,
}

impl NotifyBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest in the next report from `id`.
    ///
    /// Registrations are independent: each one is completed by the next fire.
    /// After [`close`](Self::close) the token resolves `Closed` immediately.
    pub fn register(&self, id: InstanceId) -> WaitToken {
        let (tx, rx) = oneshot::channel();
        let key = self.inner.next_key.fetch_add(1, Ordering::Relaxed);
        {
            let mut waiters = self.inner.waiters.lock();
            if !waiters.closed {
                waiters.by_instance.entry(id).or_default().push((key, tx));
            }
        }
        WaitToken {
            instance_id: id,
            key,
            rx,
            created_at: Instant::now(),
            broker: Arc::downgrade(&self.inner),
        }
    }

    /// Complete every token registered for `id` so far. Returns how many
    /// waiters were still listening.
    pub fn fire(&self, id: &InstanceId) -> usize {
        let drained = self.inner.waiters.lock().by_instance.remove(id);
        let Some(waiters) = drained else {
            return 0;
        };
        let mut notified = 0;
        for (_, tx) in waiters {
            if tx.send(()).is_ok() {
                notified += 1;
            }
        }
        notified
    }

    /// Number of outstanding registrations for `id`.
    pub fn pending(&self, id: &InstanceId) -> usize {
        self.inner.waiters.lock().by_instance.get(id).map_or(0, Vec::len)
    }

    /// Release every outstanding registration and refuse new ones.
    pub fn close(&self) {
        let drained = {
            let mut waiters = self.inner.waiters.lock();
            waiters.closed = true;
            std::mem::take(&mut waiters.by_instance)
        };
        // Senders drop outside the lock; waiters wake with `Closed`.
        drop(drained);
    }
}

/// A pending "notify me on the next report" registration.
///
/// Owned by the call that registered it and released exactly once: by firing,
/// or by being dropped.
pub struct WaitToken {
    instance_id: InstanceId,
    key: u64,
    rx: oneshot::Receiver<()>,
    created_at: Instant,
    broker: Weak<BrokerInner>,
}

impl WaitToken {
    pub fn instance_id(&self) -> InstanceId {
        self.instance_id
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Suspend until the token fires or `timeout` has elapsed since it was
    /// registered.
    pub async fn wait(mut self, timeout: Duration) -> WaitResult {
        let deadline = self.created_at + timeout;
        match tokio::time::timeout_at(deadline, &mut self.rx).await {
            Ok(Ok(())) => WaitResult::Notified,
            Ok(Err(_)) => WaitResult::Closed,
            Err(_) => WaitResult::TimedOut,
        }
    }
}

impl Drop for WaitToken {
    fn drop(&mut self) {
        let Some(inner) = self.broker.upgrade() else {
            return;
        };
        let mut waiters = inner.waiters.lock();
        if let Some(list) = waiters.by_instance.get_mut(&self.instance_id) {
            list.retain(|(key, _)| *key != self.key);
            if list.is_empty() {
                waiters.by_instance.remove(&self.instance_id);
            }
        }
    }
}

#[cfg(test)]
#[path = "notify_tests.rs"]
mod tests;
