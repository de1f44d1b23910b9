//! The boundary to whatever actually holds ciphertexts.
//!
//! The ledger only ever sees [`Handle`]s. It can ask the backend to add sealed values,
//! add a public constant, and grant decryption rights. It can never read a value.

use crate::errors::LedgerResult;
use crate::types::{Address, Handle};

/// Homomorphic operations over sealed unsigned 32-bit integers (wrapping on overflow).
///
/// Every arithmetic call returns a fresh handle; operands are never mutated.
pub trait SealedBackend {
    /// Seal a public constant.
    fn trivial(&mut self, value: u32) -> LedgerResult<Handle>;

    /// `lhs + rhs`, both sealed.
    fn add(&mut self, lhs: &Handle, rhs: &Handle) -> LedgerResult<Handle>;

    /// `lhs + rhs` where `rhs` is a public constant.
    fn add_scalar(&mut self, lhs: &Handle, rhs: u32) -> LedgerResult<Handle>;

    /// Grant `account` the right to use and request decryption of `handle`.
    fn allow(&mut self, handle: &Handle, account: Address) -> LedgerResult<()>;

    /// Allow anyone to request decryption of `handle`.
    fn make_publicly_decryptable(&mut self, handle: &Handle) -> LedgerResult<()>;

    fn is_allowed(&self, handle: &Handle, account: Address) -> bool;

    /// Whether `handle` refers to a value this backend holds.
    fn contains(&self, handle: &Handle) -> bool;

    /// Drop a value nothing will reference again. Unknown handles are ignored.
    fn release(&mut self, handle: &Handle);
}
