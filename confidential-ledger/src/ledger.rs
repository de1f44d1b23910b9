//! The ledger: every component behind one versioned state struct.
//!
//! Each public mutating method is one transaction. It runs all checks and every
//! fallible backend call before touching ledger state, then commits registry, guard,
//! aggregates and events together and bumps `version`. A rejected transaction leaves
//! the ledger exactly as it was.
//!
//! Submission pipeline: operational state -> facility -> duplicate guard -> proofs ->
//! aggregation -> events.

use crate::access::{AccessController, OperationalState};
use crate::aggregate::{AggregationEngine, EncryptedAggregate};
use crate::constants::{CATEGORY_COUNT, PROTOCOL_ID};
use crate::errors::{LedgerError, LedgerResult};
use crate::events::{EventLog, EventRecord, LedgerEvent};
use crate::guard::SubmissionGuard;
use crate::registry::FacilityRegistry;
use crate::sealed::SealedBackend;
use crate::types::{
    Address, Category, ExternalInput, Facility, FacilityId, Handle, RatingSubmission, Scope, StatisticsView, Timestamp,
};
use crate::verifier::CiphertextValidator;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Whether ratings target registered facilities or the ledger as a whole.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerMode {
    #[default]
    MultiFacility,
    SingleFacility,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    pub administrator: Address,
    /// This ledger instance's own address; proofs are bound to it.
    pub ledger_address: Address,
    #[serde(default)]
    pub mode: LedgerMode,
}

/// Who is calling, and the ledger time of the call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CallContext {
    pub caller: Address,
    pub timestamp: Timestamp,
}

impl CallContext {
    pub fn new(caller: Address, timestamp: Timestamp) -> Self {
        Self { caller, timestamp }
    }
}

/// Ledger state.
///
/// The serialized form carries the registry and the current aggregates only; its size
/// does not grow with the number of ratings. The event log and the submission flags
/// derived from it are stored separately and reattached with
/// [`Ledger::restore_history`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledger {
    ledger_address: Address,
    mode: LedgerMode,
    version: u64,
    access: AccessController,
    registry: FacilityRegistry,
    #[serde(skip)]
    guard: SubmissionGuard,
    engine: AggregationEngine,
    #[serde(skip)]
    events: EventLog,
}

impl Ledger {
    pub fn new(config: LedgerConfig) -> Self {
        Self {
            ledger_address: config.ledger_address,
            mode: config.mode,
            version: 0,
            access: AccessController::new(config.administrator),
            registry: FacilityRegistry::new(),
            guard: SubmissionGuard::new(),
            engine: AggregationEngine::new(),
            events: EventLog::new(),
        }
    }

    fn commit(&mut self, events: Vec<LedgerEvent>) {
        self.version += 1;
        self.events.append(self.version, events);
    }

    /// Reattach the event log to a deserialized ledger and replay the submission flags
    /// from the ratings it records.
    pub fn restore_history(&mut self, records: Vec<EventRecord>) -> LedgerResult<()> {
        let log = EventLog::from_records(records)?;
        if log.all().last().is_some_and(|r| r.version > self.version) {
            return Err(LedgerError::InvalidState(format!(
                "event log is ahead of ledger version {}",
                self.version
            )));
        }

        let mut guard = SubmissionGuard::new();
        for record in log.all() {
            if let LedgerEvent::RatingSubmitted { participant, facility_id, .. } = &record.event {
                guard
                    .record(*participant, *facility_id)
                    .map_err(|e| LedgerError::InvalidState(format!("event {}: {e}", record.seq)))?;
            }
        }

        self.guard = guard;
        self.events = log;
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Administration
    // ---------------------------------------------------------------------

    fn ensure_admin_active(&self, ctx: &CallContext) -> LedgerResult<()> {
        self.access.ensure_admin(ctx.caller)?;
        self.access.ensure_active()
    }

    pub fn create_facility(&mut self, ctx: &CallContext, name: &str, location: &str) -> LedgerResult<FacilityId> {
        self.ensure_admin_active(ctx)?;
        if self.mode == LedgerMode::SingleFacility {
            return Err(LedgerError::InvalidState(
                "facility registry is disabled in single-facility mode".to_string(),
            ));
        }

        let id = self.registry.create(name, location, ctx.timestamp)?;
        self.engine.open_scope(id);
        self.commit(vec![LedgerEvent::FacilityCreated {
            facility_id: id,
            name: name.to_string(),
            location: location.to_string(),
            creator: ctx.caller,
            timestamp: ctx.timestamp,
        }]);

        info!(facility_id = id, version = self.version, "facility created");
        Ok(id)
    }

    fn set_facility_active(&mut self, ctx: &CallContext, id: FacilityId, active: bool) -> LedgerResult<()> {
        self.ensure_admin_active(ctx)?;

        if !self.registry.set_active(id, active)? {
            debug!(facility_id = id, active, "facility status unchanged");
            return Ok(());
        }

        self.commit(vec![LedgerEvent::FacilityStatusChanged {
            facility_id: id,
            active,
            caller: ctx.caller,
            timestamp: ctx.timestamp,
        }]);
        info!(facility_id = id, active, version = self.version, "facility status changed");
        Ok(())
    }

    /// Stop accepting ratings for `id`. Idempotent.
    pub fn deactivate_facility(&mut self, ctx: &CallContext, id: FacilityId) -> LedgerResult<()> {
        self.set_facility_active(ctx, id, false)
    }

    /// Accept ratings for `id` again. Idempotent.
    pub fn reactivate_facility(&mut self, ctx: &CallContext, id: FacilityId) -> LedgerResult<()> {
        self.set_facility_active(ctx, id, true)
    }

    pub fn stop(&mut self, ctx: &CallContext) -> LedgerResult<()> {
        self.access.stop(ctx.caller)?;
        self.commit(vec![LedgerEvent::EmergencyStop { caller: ctx.caller, timestamp: ctx.timestamp }]);
        info!(caller = %ctx.caller, version = self.version, "ledger stopped");
        Ok(())
    }

    pub fn resume(&mut self, ctx: &CallContext) -> LedgerResult<()> {
        self.access.resume(ctx.caller)?;
        self.commit(vec![LedgerEvent::ContractResumed { caller: ctx.caller, timestamp: ctx.timestamp }]);
        info!(caller = %ctx.caller, version = self.version, "ledger resumed");
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Submission
    // ---------------------------------------------------------------------

    fn resolve_target(&self, facility: Option<FacilityId>) -> LedgerResult<Option<FacilityId>> {
        match (self.mode, facility) {
            (LedgerMode::MultiFacility, Some(id)) => {
                self.registry.ensure_accepting(id)?;
                Ok(Some(id))
            }
            (LedgerMode::MultiFacility, None) => {
                Err(LedgerError::InvalidFacility("a facility id is required".to_string()))
            }
            (LedgerMode::SingleFacility, None) => Ok(None),
            (LedgerMode::SingleFacility, Some(id)) => Err(LedgerError::InvalidFacility(format!(
                "single-facility ledger does not take a facility id (got {id})"
            ))),
        }
    }

    fn validate_input<B: SealedBackend, V: CiphertextValidator>(
        &self,
        backend: &B,
        validator: &V,
        sender: Address,
        what: &str,
        input: &ExternalInput,
    ) -> LedgerResult<Handle> {
        let handle = validator
            .validate(input, sender, self.ledger_address)
            .map_err(|e| match e {
                LedgerError::InvalidProof(m) => LedgerError::InvalidProof(format!("{what}: {m}")),
                other => other,
            })?;
        if !backend.contains(&handle) {
            return Err(LedgerError::InvalidProof(format!("{what}: handle {} is unknown", handle.short())));
        }
        Ok(handle)
    }

    /// Accept one sealed rating from `ctx.caller`.
    ///
    /// `facility` must be `Some` in multi-facility mode and `None` in single-facility
    /// mode. On success the caller is flagged, the global aggregate (and the facility's)
    /// absorb the scores, and the caller is granted its own input handles.
    pub fn submit_rating<B: SealedBackend, V: CiphertextValidator>(
        &mut self,
        ctx: &CallContext,
        backend: &mut B,
        validator: &V,
        facility: Option<FacilityId>,
        submission: &RatingSubmission,
    ) -> LedgerResult<()> {
        let result = self.try_submit(ctx, backend, validator, facility, submission);
        if let Err(e) = &result {
            debug!(participant = %ctx.caller, ?facility, error = %e, "rating rejected");
        }
        result
    }

    fn try_submit<B: SealedBackend, V: CiphertextValidator>(
        &mut self,
        ctx: &CallContext,
        backend: &mut B,
        validator: &V,
        facility: Option<FacilityId>,
        submission: &RatingSubmission,
    ) -> LedgerResult<()> {
        self.access.ensure_active()?;
        let target = self.resolve_target(facility)?;
        self.guard.check(ctx.caller, target)?;

        let identity = self.validate_input(backend, validator, ctx.caller, "identity", &submission.identity)?;
        let mut values = [Handle::ZERO; CATEGORY_COUNT];
        for category in Category::ALL {
            values[category.index()] =
                self.validate_input(backend, validator, ctx.caller, category.as_str(), submission.score(category))?;
        }

        let staged = self.engine.stage(backend, target, &values, self.ledger_address)?;

        // The submitter may decrypt its own inputs; nobody else gains anything on them.
        for handle in std::iter::once(&identity).chain(values.iter()) {
            backend.allow(handle, ctx.caller)?;
        }

        // Commit.
        self.guard.record(ctx.caller, target)?;
        for handle in self.engine.apply(staged) {
            backend.release(&handle);
        }
        self.commit(vec![
            LedgerEvent::RatingSubmitted { participant: ctx.caller, facility_id: target, timestamp: ctx.timestamp },
            LedgerEvent::StatisticsUpdated { timestamp: ctx.timestamp },
        ]);

        info!(participant = %ctx.caller, facility_id = ?target, version = self.version, "rating accepted");
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------------

    pub fn protocol_id(&self) -> u64 {
        PROTOCOL_ID
    }

    pub fn administrator(&self) -> Address {
        self.access.administrator()
    }

    pub fn operational_state(&self) -> OperationalState {
        self.access.state()
    }

    pub fn ledger_address(&self) -> Address {
        self.ledger_address
    }

    pub fn mode(&self) -> LedgerMode {
        self.mode
    }

    /// Number of committed transactions.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn facility(&self, id: FacilityId) -> LedgerResult<&Facility> {
        self.registry.get(id)
    }

    pub fn all_facility_ids(&self) -> Vec<FacilityId> {
        self.registry.list_all()
    }

    pub fn active_facility_ids(&self) -> Vec<FacilityId> {
        self.registry.list_active()
    }

    pub fn total_facilities(&self) -> usize {
        self.registry.len()
    }

    pub fn has_submitted(&self, participant: Address) -> bool {
        self.guard.has_submitted(participant)
    }

    pub fn has_submitted_to(&self, participant: Address, facility: FacilityId) -> bool {
        self.guard.has_submitted_to(participant, facility)
    }

    pub fn global_statistics(&self) -> StatisticsView {
        self.engine.aggregate(Scope::Global).map(EncryptedAggregate::statistics).unwrap_or_default()
    }

    pub fn facility_statistics(&self, id: FacilityId) -> LedgerResult<StatisticsView> {
        self.engine.statistics(Scope::Facility(id))
    }

    pub fn statistics(&self, scope: Scope) -> LedgerResult<StatisticsView> {
        self.engine.statistics(scope)
    }

    pub fn aggregate(&self, scope: Scope) -> LedgerResult<&EncryptedAggregate> {
        self.engine.aggregate(scope)
    }

    pub fn events(&self) -> &[EventRecord] {
        self.events.all()
    }

    pub fn events_since(&self, seq: u64) -> &[EventRecord] {
        self.events.since(seq)
    }

    /// Timestamp of the most recent event, if any.
    pub fn last_timestamp(&self) -> Option<Timestamp> {
        self.events.all().last().map(|r| r.event.timestamp())
    }
}
