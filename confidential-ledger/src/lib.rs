//! Confidential aggregation ledger for facility quality ratings.
//!
//! This crate contains:
//! - The ledger core: facility registry, submission guard, access control and the
//!   aggregation engine that folds sealed (encrypted) scores into running totals.
//! - The seams to the outside world: a sealed-value backend trait and a ciphertext
//!   validator trait, with a Poseidon-bound verifier and a plaintext-backed development
//!   coprocessor.
//! - A client-side input builder that range-checks and seals a rating before submission.

pub mod access;
pub mod aggregate;
pub mod clear;
pub mod client;
pub mod constants;
pub mod errors;
pub mod events;
pub mod guard;
pub mod ledger;
pub mod registry;
pub mod sealed;
pub mod types;
pub mod verifier;

pub use errors::{LedgerError, LedgerResult};
pub use ledger::{CallContext, Ledger, LedgerConfig, LedgerMode};
