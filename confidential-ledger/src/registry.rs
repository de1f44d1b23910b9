//! Facility registry.
//!
//! Ids are sequential from [`FIRST_FACILITY_ID`] and never reused. Facilities are never
//! removed; `is_active` is the only lifecycle switch. Admin and pause checks are the
//! caller's job (see [`crate::ledger::Ledger`]); the registry owns the table only.

use crate::constants::FIRST_FACILITY_ID;
use crate::errors::{LedgerError, LedgerResult};
use crate::types::{Facility, FacilityId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacilityRegistry {
    facilities: BTreeMap<FacilityId, Facility>,
}

impl FacilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> FacilityId {
        self.facilities
            .last_key_value()
            .map(|(id, _)| id + 1)
            .unwrap_or(FIRST_FACILITY_ID)
    }

    /// Register a new, active facility and return its id.
    pub fn create(&mut self, name: &str, location: &str, now: Timestamp) -> LedgerResult<FacilityId> {
        if name.trim().is_empty() {
            return Err(LedgerError::InvalidInput("facility name must not be empty".to_string()));
        }
        if location.trim().is_empty() {
            return Err(LedgerError::InvalidInput("facility location must not be empty".to_string()));
        }

        let id = self.next_id();
        self.facilities.insert(
            id,
            Facility {
                id,
                name: name.to_string(),
                location: location.to_string(),
                created_at: now,
                is_active: true,
            },
        );
        Ok(id)
    }

    /// Set the active flag. Returns whether anything changed; a redundant call is a no-op.
    pub fn set_active(&mut self, id: FacilityId, active: bool) -> LedgerResult<bool> {
        let facility = self.facilities.get_mut(&id).ok_or(LedgerError::NotFound(id))?;
        if facility.is_active == active {
            return Ok(false);
        }
        facility.is_active = active;
        Ok(true)
    }

    pub fn get(&self, id: FacilityId) -> LedgerResult<&Facility> {
        self.facilities.get(&id).ok_or(LedgerError::NotFound(id))
    }

    pub fn contains(&self, id: FacilityId) -> bool {
        self.facilities.contains_key(&id)
    }

    /// The facility a submission targets, provided it exists and is active.
    pub fn ensure_accepting(&self, id: FacilityId) -> LedgerResult<&Facility> {
        match self.facilities.get(&id) {
            Some(f) if f.is_active => Ok(f),
            Some(_) => Err(LedgerError::InvalidFacility(format!("facility {id} is inactive"))),
            None => Err(LedgerError::InvalidFacility(format!("facility {id} does not exist"))),
        }
    }

    /// All ids in creation order, inactive ones included.
    pub fn list_all(&self) -> Vec<FacilityId> {
        self.facilities.keys().copied().collect()
    }

    pub fn list_active(&self) -> Vec<FacilityId> {
        self.facilities.values().filter(|f| f.is_active).map(|f| f.id).collect()
    }

    pub fn len(&self) -> usize {
        self.facilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facilities.is_empty()
    }
}
