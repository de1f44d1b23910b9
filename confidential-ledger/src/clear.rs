//! Plaintext-backed coprocessor for development and tests.
//!
//! Values sit in the clear behind opaque handles, so the ledger logic can be exercised
//! end to end and aggregates can be decrypted to check arithmetic. The ACL is enforced
//! on decryption exactly as a real coprocessor would enforce it.
//!
//! NOT CONFIDENTIAL. Never deploy with real ratings.

use crate::errors::{LedgerError, LedgerResult};
use crate::sealed::SealedBackend;
use crate::types::{Address, ExternalInput, Handle, HANDLE_LEN};
use crate::verifier::InputAttestor;
use rand::rngs::OsRng;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use std::collections::{BTreeMap, BTreeSet};

/// A stored value with its access list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SealedEntry {
    pub value: u32,
    pub allowed: BTreeSet<Address>,
    pub public: bool,
}

/// What changed since the last checkpoint, for incremental persistence.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CoprocessorDelta {
    /// Handles issued so far; the next handle is derived from this.
    pub issued: u64,
    pub upserted: Vec<(Handle, SealedEntry)>,
    pub removed: Vec<Handle>,
}

impl CoprocessorDelta {
    pub fn is_empty(&self) -> bool {
        self.upserted.is_empty() && self.removed.is_empty()
    }
}

/// Every mutation is journaled until [`ClearCoprocessor::take_changes`] (which moves
/// the checkpoint forward) or [`ClearCoprocessor::rollback`] (which returns to it).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClearCoprocessor {
    seed: [u8; 32],
    issued: u64,
    entries: BTreeMap<Handle, SealedEntry>,
    /// Pre-checkpoint state of each handle touched since, `None` if it did not exist.
    journal: BTreeMap<Handle, Option<SealedEntry>>,
    checkpoint_issued: u64,
}

impl ClearCoprocessor {
    pub fn new() -> Self {
        let mut seed = [0u8; 32];
        OsRng.fill_bytes(&mut seed);
        Self::with_seed(seed)
    }

    /// Deterministic handle sequence; same seed, same handles.
    pub fn with_seed(seed: [u8; 32]) -> Self {
        Self::restore(seed, 0, std::iter::empty())
    }

    /// Rebuild from persisted parts. The result starts at a clean checkpoint.
    pub fn restore(seed: [u8; 32], issued: u64, entries: impl IntoIterator<Item = (Handle, SealedEntry)>) -> Self {
        Self {
            seed,
            issued,
            entries: entries.into_iter().collect(),
            journal: BTreeMap::new(),
            checkpoint_issued: issued,
        }
    }

    pub fn seed(&self) -> [u8; 32] {
        self.seed
    }

    pub fn issued(&self) -> u64 {
        self.issued
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&Handle, &SealedEntry)> {
        self.entries.iter()
    }

    /// Collect the net changes since the last checkpoint and start a new one.
    ///
    /// Handles created and released in between do not appear at all.
    pub fn take_changes(&mut self) -> CoprocessorDelta {
        let mut delta = CoprocessorDelta { issued: self.issued, ..CoprocessorDelta::default() };
        for (handle, prior) in std::mem::take(&mut self.journal) {
            match (self.entries.get(&handle), prior) {
                (Some(current), prior) => {
                    if prior.as_ref() != Some(current) {
                        delta.upserted.push((handle, current.clone()));
                    }
                }
                (None, Some(_)) => delta.removed.push(handle),
                (None, None) => {}
            }
        }
        self.checkpoint_issued = self.issued;
        delta
    }

    /// Undo everything since the last checkpoint, including handle issuance.
    pub fn rollback(&mut self) {
        for (handle, prior) in std::mem::take(&mut self.journal) {
            match prior {
                Some(entry) => {
                    self.entries.insert(handle, entry);
                }
                None => {
                    self.entries.remove(&handle);
                }
            }
        }
        self.issued = self.checkpoint_issued;
    }

    fn touch(&mut self, handle: &Handle) {
        if !self.journal.contains_key(handle) {
            let prior = self.entries.get(handle).cloned();
            self.journal.insert(*handle, prior);
        }
    }

    fn next_handle(&mut self) -> Handle {
        // Each handle consumes 8 words of the ChaCha stream.
        let mut rng = ChaCha20Rng::from_seed(self.seed);
        rng.set_word_pos(u128::from(self.issued) * (HANDLE_LEN as u128 / 4));
        self.issued += 1;

        let mut h = [0u8; HANDLE_LEN];
        rng.fill_bytes(&mut h);
        // The all-zero handle is reserved for "uninitialized".
        if h == [0u8; HANDLE_LEN] {
            h[0] = 1;
        }
        Handle(h)
    }

    fn insert(&mut self, value: u32) -> Handle {
        let handle = self.next_handle();
        self.touch(&handle);
        self.entries.insert(handle, SealedEntry { value, allowed: BTreeSet::new(), public: false });
        handle
    }

    fn entry(&self, handle: &Handle) -> LedgerResult<&SealedEntry> {
        self.entries
            .get(handle)
            .ok_or_else(|| LedgerError::Coprocessor(format!("unknown handle {}", handle.short())))
    }

    fn entry_mut(&mut self, handle: &Handle) -> LedgerResult<&mut SealedEntry> {
        if self.entries.contains_key(handle) {
            self.touch(handle);
        }
        self.entries
            .get_mut(handle)
            .ok_or_else(|| LedgerError::Coprocessor(format!("unknown handle {}", handle.short())))
    }

    /// Client-side sealing: store `value` under a fresh handle and attest it for
    /// (sender, ledger).
    pub fn encrypt_input<A: InputAttestor>(
        &mut self,
        attestor: &A,
        value: u32,
        sender: Address,
        ledger: Address,
    ) -> LedgerResult<ExternalInput> {
        let handle = self.insert(value);
        let proof = attestor.attest(&handle, sender, ledger)?;
        Ok(ExternalInput { handle, proof })
    }

    /// Decrypt a handle that has been made publicly decryptable.
    ///
    /// The uninitialized sentinel decrypts to zero.
    pub fn public_decrypt(&self, handle: &Handle) -> LedgerResult<u32> {
        if handle.is_uninitialized() {
            return Ok(0);
        }
        let entry = self.entry(handle)?;
        if !entry.public {
            return Err(LedgerError::Coprocessor(format!(
                "handle {} is not publicly decryptable",
                handle.short()
            )));
        }
        Ok(entry.value)
    }

    /// Decrypt on behalf of `account`, which must have been granted the handle.
    pub fn user_decrypt(&self, handle: &Handle, account: Address) -> LedgerResult<u32> {
        if handle.is_uninitialized() {
            return Ok(0);
        }
        let entry = self.entry(handle)?;
        if !entry.allowed.contains(&account) {
            return Err(LedgerError::Coprocessor(format!(
                "{account} is not allowed to decrypt handle {}",
                handle.short()
            )));
        }
        Ok(entry.value)
    }

    pub fn is_publicly_decryptable(&self, handle: &Handle) -> bool {
        self.entries.get(handle).is_some_and(|e| e.public)
    }
}

impl Default for ClearCoprocessor {
    fn default() -> Self {
        Self::new()
    }
}

impl SealedBackend for ClearCoprocessor {
    fn trivial(&mut self, value: u32) -> LedgerResult<Handle> {
        Ok(self.insert(value))
    }

    fn add(&mut self, lhs: &Handle, rhs: &Handle) -> LedgerResult<Handle> {
        let sum = self.entry(lhs)?.value.wrapping_add(self.entry(rhs)?.value);
        Ok(self.insert(sum))
    }

    fn add_scalar(&mut self, lhs: &Handle, rhs: u32) -> LedgerResult<Handle> {
        let sum = self.entry(lhs)?.value.wrapping_add(rhs);
        Ok(self.insert(sum))
    }

    fn allow(&mut self, handle: &Handle, account: Address) -> LedgerResult<()> {
        self.entry_mut(handle)?.allowed.insert(account);
        Ok(())
    }

    fn make_publicly_decryptable(&mut self, handle: &Handle) -> LedgerResult<()> {
        self.entry_mut(handle)?.public = true;
        Ok(())
    }

    fn is_allowed(&self, handle: &Handle, account: Address) -> bool {
        self.entries.get(handle).is_some_and(|e| e.allowed.contains(&account))
    }

    fn contains(&self, handle: &Handle) -> bool {
        self.entries.contains_key(handle)
    }

    fn release(&mut self, handle: &Handle) {
        if self.entries.contains_key(handle) {
            self.touch(handle);
            self.entries.remove(handle);
        }
    }
}
