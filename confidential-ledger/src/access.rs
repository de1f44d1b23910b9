//! Administrator identity and the Active/Stopped switch.

use crate::errors::{LedgerError, LedgerResult};
use crate::types::Address;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationalState {
    Active,
    Stopped,
}

impl fmt::Display for OperationalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationalState::Active => f.write_str("active"),
            OperationalState::Stopped => f.write_str("stopped"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessController {
    administrator: Address,
    operational: OperationalState,
}

impl AccessController {
    pub fn new(administrator: Address) -> Self {
        Self { administrator, operational: OperationalState::Active }
    }

    pub fn administrator(&self) -> Address {
        self.administrator
    }

    pub fn state(&self) -> OperationalState {
        self.operational
    }

    pub fn is_active(&self) -> bool {
        self.operational == OperationalState::Active
    }

    pub fn ensure_admin(&self, caller: Address) -> LedgerResult<()> {
        if caller != self.administrator {
            return Err(LedgerError::Unauthorized { caller });
        }
        Ok(())
    }

    /// Gate for every mutating operation other than stop/resume.
    pub fn ensure_active(&self) -> LedgerResult<()> {
        if !self.is_active() {
            return Err(LedgerError::InvalidState("ledger is stopped".to_string()));
        }
        Ok(())
    }

    /// Active -> Stopped.
    pub fn stop(&mut self, caller: Address) -> LedgerResult<()> {
        self.ensure_admin(caller)?;
        if self.operational == OperationalState::Stopped {
            return Err(LedgerError::InvalidState("ledger is already stopped".to_string()));
        }
        self.operational = OperationalState::Stopped;
        Ok(())
    }

    /// Stopped -> Active.
    pub fn resume(&mut self, caller: Address) -> LedgerResult<()> {
        self.ensure_admin(caller)?;
        if self.operational == OperationalState::Active {
            return Err(LedgerError::InvalidState("ledger is already active".to_string()));
        }
        self.operational = OperationalState::Active;
        Ok(())
    }
}
