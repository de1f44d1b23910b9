//! Exactly-once submission flags.
//!
//! Records *that* a participant submitted, never *what*. Flags are write-once.

use crate::errors::{LedgerError, LedgerResult};
use crate::types::{Address, FacilityId};
use std::collections::BTreeSet;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubmissionGuard {
    scoped: BTreeSet<(Address, FacilityId)>,
    anywhere: BTreeSet<Address>,
}

impl SubmissionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `participant` has had any submission accepted.
    pub fn has_submitted(&self, participant: Address) -> bool {
        self.anywhere.contains(&participant)
    }

    pub fn has_submitted_to(&self, participant: Address, facility: FacilityId) -> bool {
        self.scoped.contains(&(participant, facility))
    }

    /// Fail if the flag that gates this target is already set.
    ///
    /// `None` is the single-facility target, gated by the global flag.
    pub fn check(&self, participant: Address, facility: Option<FacilityId>) -> LedgerResult<()> {
        match facility {
            Some(id) if self.has_submitted_to(participant, id) => Err(LedgerError::DuplicateSubmission(format!(
                "{participant} has already rated facility {id}"
            ))),
            None if self.has_submitted(participant) => {
                Err(LedgerError::DuplicateSubmission(format!("{participant} has already rated")))
            }
            _ => Ok(()),
        }
    }

    /// Check, then set. The global flag is always set alongside the scoped one.
    pub fn record(&mut self, participant: Address, facility: Option<FacilityId>) -> LedgerResult<()> {
        self.check(participant, facility)?;
        if let Some(id) = facility {
            self.scoped.insert((participant, id));
        }
        self.anywhere.insert(participant);
        Ok(())
    }
}
