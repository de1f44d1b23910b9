//! Encrypted running statistics.
//!
//! Two scopes: one global aggregate and one per facility. Each holds a sealed count,
//! one sealed sum per category, and a sealed total (the sum of all categories of every
//! accepted rating). The only write path is [`AggregationEngine::stage`] followed by
//! [`AggregationEngine::apply`]; nothing is ever decremented or overwritten except by
//! its own successor.
//!
//! Staging runs every fallible backend call and grant first, so a failure leaves the
//! engine untouched. Scratch ciphertexts (partial totals, materialized zeros) are
//! released during staging; the aggregates a commit replaces are handed back by
//! [`AggregationEngine::apply`] for the caller to release. What the backend retains is
//! therefore the current aggregates plus whatever inputs the caller keeps.

use crate::constants::CATEGORY_COUNT;
use crate::errors::{LedgerError, LedgerResult};
use crate::sealed::SealedBackend;
use crate::types::{Address, Category, FacilityId, Handle, Scope, StatisticsView};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::trace;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedAggregate {
    pub count: Handle,
    pub sums: [Handle; CATEGORY_COUNT],
    pub total: Handle,
}

impl EncryptedAggregate {
    /// The empty aggregate: every handle is the uninitialized sentinel.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn sum(&self, category: Category) -> Handle {
        self.sums[category.index()]
    }

    pub fn handles(&self) -> impl Iterator<Item = &Handle> {
        std::iter::once(&self.count).chain(self.sums.iter()).chain(std::iter::once(&self.total))
    }

    pub fn statistics(&self) -> StatisticsView {
        StatisticsView {
            count: self.count,
            sum_service: self.sum(Category::Service),
            sum_medicine: self.sum(Category::Medicine),
            sum_doctor: self.sum(Category::Doctor),
            sum_facility: self.sum(Category::Facility),
            sum_environment: self.sum(Category::Environment),
            sum_guidance: self.sum(Category::Guidance),
            sum_total: self.total,
        }
    }
}

/// Successor aggregates computed for one submission, not yet visible.
#[derive(Clone, Debug)]
pub struct StagedUpdate {
    facility: Option<FacilityId>,
    global: EncryptedAggregate,
    scoped: Option<EncryptedAggregate>,
    superseded: Vec<Handle>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationEngine {
    global: EncryptedAggregate,
    facilities: BTreeMap<FacilityId, EncryptedAggregate>,
}

/// `acc + value`; an uninitialized accumulator is materialized as a sealed zero first,
/// so the result never aliases the participant's own input handle.
fn add_sealed<B: SealedBackend>(backend: &mut B, acc: &Handle, value: &Handle) -> LedgerResult<Handle> {
    if acc.is_uninitialized() {
        let zero = backend.trivial(0)?;
        let sum = backend.add(&zero, value);
        backend.release(&zero);
        return sum;
    }
    backend.add(acc, value)
}

fn add_plain<B: SealedBackend>(backend: &mut B, acc: &Handle, k: u32) -> LedgerResult<Handle> {
    if acc.is_uninitialized() {
        return backend.trivial(k);
    }
    backend.add_scalar(acc, k)
}

fn accumulate<B: SealedBackend>(
    backend: &mut B,
    current: &EncryptedAggregate,
    values: &[Handle; CATEGORY_COUNT],
    total: &Handle,
) -> LedgerResult<EncryptedAggregate> {
    let count = add_plain(backend, &current.count, 1)?;

    let mut sums = [Handle::ZERO; CATEGORY_COUNT];
    for (i, value) in values.iter().enumerate() {
        sums[i] = add_sealed(backend, &current.sums[i], value)?;
    }

    let total = add_sealed(backend, &current.total, total)?;
    Ok(EncryptedAggregate { count, sums, total })
}

/// The ledger keeps using the handle; anyone may request its decryption.
fn grant<B: SealedBackend>(backend: &mut B, aggregate: &EncryptedAggregate, ledger: Address) -> LedgerResult<()> {
    for handle in aggregate.handles() {
        backend.allow(handle, ledger)?;
        backend.make_publicly_decryptable(handle)?;
    }
    Ok(())
}

impl AggregationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start an empty aggregate for a newly registered facility.
    pub fn open_scope(&mut self, facility: FacilityId) {
        self.facilities.entry(facility).or_insert_with(EncryptedAggregate::empty);
    }

    pub fn aggregate(&self, scope: Scope) -> LedgerResult<&EncryptedAggregate> {
        match scope {
            Scope::Global => Ok(&self.global),
            Scope::Facility(id) => self.facilities.get(&id).ok_or(LedgerError::NotFound(id)),
        }
    }

    pub fn statistics(&self, scope: Scope) -> LedgerResult<StatisticsView> {
        self.aggregate(scope).map(EncryptedAggregate::statistics)
    }

    /// Compute the successors of the global aggregate and (if `facility` is set) that
    /// facility's aggregate, and grant permissions on every new handle.
    ///
    /// `values` are validated handles indexed by [`Category::index`].
    pub fn stage<B: SealedBackend>(
        &self,
        backend: &mut B,
        facility: Option<FacilityId>,
        values: &[Handle; CATEGORY_COUNT],
        ledger: Address,
    ) -> LedgerResult<StagedUpdate> {
        let scoped_current = match facility {
            Some(id) => Some(self.facilities.get(&id).ok_or(LedgerError::NotFound(id))?),
            None => None,
        };

        // Per-submission total across categories, shared by both scopes.
        let mut total = backend.add(&values[0], &values[1])?;
        for value in &values[2..] {
            let next = backend.add(&total, value)?;
            backend.release(&total);
            total = next;
        }

        let global = accumulate(backend, &self.global, values, &total)?;
        let scoped = match scoped_current {
            Some(current) => Some(accumulate(backend, current, values, &total)?),
            None => None,
        };
        backend.release(&total);

        grant(backend, &global, ledger)?;
        if let Some(agg) = &scoped {
            grant(backend, agg, ledger)?;
        }

        let superseded = self
            .global
            .handles()
            .chain(scoped_current.into_iter().flat_map(EncryptedAggregate::handles))
            .filter(|h| !h.is_uninitialized())
            .copied()
            .collect();

        trace!(count = %global.count.short(), ?facility, "staged aggregate update");
        Ok(StagedUpdate { facility, global, scoped, superseded })
    }

    /// Make a staged update visible. Infallible.
    ///
    /// Returns the handles of the aggregates it replaced; nothing in the engine refers
    /// to them any more.
    #[must_use]
    pub fn apply(&mut self, update: StagedUpdate) -> Vec<Handle> {
        self.global = update.global;
        if let (Some(id), Some(agg)) = (update.facility, update.scoped) {
            self.facilities.insert(id, agg);
        }
        update.superseded
    }

    /// Stage and apply in one step.
    pub fn absorb<B: SealedBackend>(
        &mut self,
        backend: &mut B,
        facility: Option<FacilityId>,
        values: &[Handle; CATEGORY_COUNT],
        ledger: Address,
    ) -> LedgerResult<()> {
        let update = self.stage(backend, facility, values, ledger)?;
        for handle in self.apply(update) {
            backend.release(&handle);
        }
        Ok(())
    }
}
