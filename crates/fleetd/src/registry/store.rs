// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory table of agent records.
//!
//! Every operation runs under one short-lived mutex and never awaits, so a
//! reader always sees each record as it stood between two writes. Records are
//! cloned under the lock; callers never hold a reference into the table.

use indexmap::IndexMap;
use parking_lot::Mutex;

use super::types::{epoch_ms, AgentRecord, InstanceId, ReportedState};

/// How a new report is combined with the previously reported state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ReportMerge {
    /// Replace the reported state wholesale.
    #[default]
    Replace,
    /// Overlay top-level fields of the new report onto the previous state.
    Overlay,
}

/// Authoritative table of agent records keyed by instance id.
pub struct AgentStore {
    records: Mutex<IndexMap<InstanceId, AgentRecord>>,
    merge: ReportMerge,
}

impl AgentStore {
    pub fn new(merge: ReportMerge) -> Self {
        Self { records: Mutex::new(IndexMap::new()), merge }
    }

    /// Deep clone of one record.
    pub fn get(&self, id: &InstanceId) -> Option<AgentRecord> {
        self.records.lock().get(id).cloned()
    }

    /// Deep clone of every record, in first-seen order, taken under a single
    /// lock acquisition.
    pub fn get_all(&self) -> Vec<AgentRecord> {
        self.records.lock().values().cloned().collect()
    }

    pub fn contains(&self, id: &InstanceId) -> bool {
        self.records.lock().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply an inbound report. Returns `true` when the record was created.
    pub fn upsert_from_report(&self, id: InstanceId, reported_state: ReportedState) -> bool {
        let now = epoch_ms();
        let mut records = self.records.lock();
        match records.get_mut(&id) {
            Some(record) => {
                match self.merge {
                    ReportMerge::Replace => record.reported_state = reported_state,
                    ReportMerge::Overlay => record.reported_state.overlay(reported_state),
                }
                record.report_seq += 1;
                record.last_report_ms = now;
                false
            }
            None => {
                records.insert(id, AgentRecord::from_first_report(id, reported_state, now));
                true
            }
        }
    }

    /// Run `mutator` against the record for `id`. Returns `false` for an
    /// unknown agent, in which case `mutator` is not called.
    pub fn apply_mutation<F>(&self, id: &InstanceId, mutator: F) -> bool
    where
        F: FnOnce(&mut AgentRecord),
    {
        self.update(id, mutator).is_some()
    }

    /// Like [`apply_mutation`](Self::apply_mutation), but hands back what
    /// `f` returns. `None` means the agent is unknown.
    pub fn update<F, R>(&self, id: &InstanceId, f: F) -> Option<R>
    where
        F: FnOnce(&mut AgentRecord) -> R,
    {
        self.records.lock().get_mut(id).map(f)
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
