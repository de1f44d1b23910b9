//! Append-only event log for off-ledger observers.

use crate::errors::{LedgerError, LedgerResult};
use crate::types::{Address, FacilityId, Timestamp};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LedgerEvent {
    FacilityCreated {
        facility_id: FacilityId,
        name: String,
        location: String,
        creator: Address,
        timestamp: Timestamp,
    },
    FacilityStatusChanged {
        facility_id: FacilityId,
        active: bool,
        caller: Address,
        timestamp: Timestamp,
    },
    RatingSubmitted {
        participant: Address,
        facility_id: Option<FacilityId>,
        timestamp: Timestamp,
    },
    StatisticsUpdated {
        timestamp: Timestamp,
    },
    EmergencyStop {
        caller: Address,
        timestamp: Timestamp,
    },
    ContractResumed {
        caller: Address,
        timestamp: Timestamp,
    },
}

impl LedgerEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerEvent::FacilityCreated { .. } => "facility_created",
            LedgerEvent::FacilityStatusChanged { .. } => "facility_status_changed",
            LedgerEvent::RatingSubmitted { .. } => "rating_submitted",
            LedgerEvent::StatisticsUpdated { .. } => "statistics_updated",
            LedgerEvent::EmergencyStop { .. } => "emergency_stop",
            LedgerEvent::ContractResumed { .. } => "contract_resumed",
        }
    }

    pub fn timestamp(&self) -> Timestamp {
        match self {
            LedgerEvent::FacilityCreated { timestamp, .. }
            | LedgerEvent::FacilityStatusChanged { timestamp, .. }
            | LedgerEvent::RatingSubmitted { timestamp, .. }
            | LedgerEvent::StatisticsUpdated { timestamp }
            | LedgerEvent::EmergencyStop { timestamp, .. }
            | LedgerEvent::ContractResumed { timestamp, .. } => *timestamp,
        }
    }
}

/// An event with its position in the log and the ledger version that produced it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub seq: u64,
    pub version: u64,
    pub event: LedgerEvent,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EventLog {
    records: Vec<EventRecord>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a log from stored records.
    ///
    /// Records must be numbered `0..n` in order, with non-decreasing versions.
    pub fn from_records(records: Vec<EventRecord>) -> LedgerResult<Self> {
        for (i, record) in records.iter().enumerate() {
            if record.seq != i as u64 {
                return Err(LedgerError::InvalidState(format!("event log gap: expected seq {i}, found {}", record.seq)));
            }
        }
        if records.windows(2).any(|w| w[1].version < w[0].version) {
            return Err(LedgerError::InvalidState("event log versions go backwards".to_string()));
        }
        Ok(Self { records })
    }

    /// Append events of one committed transaction, in emission order.
    pub fn append(&mut self, version: u64, events: Vec<LedgerEvent>) {
        for event in events {
            let seq = self.records.len() as u64;
            self.records.push(EventRecord { seq, version, event });
        }
    }

    pub fn all(&self) -> &[EventRecord] {
        &self.records
    }

    /// Records with `seq >= from`.
    pub fn since(&self, from: u64) -> &[EventRecord] {
        let start = usize::try_from(from).unwrap_or(usize::MAX).min(self.records.len());
        &self.records[start..]
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
