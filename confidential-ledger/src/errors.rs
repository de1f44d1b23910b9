use crate::types::{Address, FacilityId};
use thiserror::Error;

/// Every way a ledger transaction can be rejected.
///
/// A rejected transaction leaves the ledger exactly as it was.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("unauthorized: {caller} is not the administrator")]
    Unauthorized { caller: Address },

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("facility {0} not found")]
    NotFound(FacilityId),

    #[error("invalid facility: {0}")]
    InvalidFacility(String),

    #[error("duplicate submission: {0}")]
    DuplicateSubmission(String),

    #[error("invalid proof: {0}")]
    InvalidProof(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("coprocessor error: {0}")]
    Coprocessor(String),
}

pub type LedgerResult<T> = Result<T, LedgerError>;
