//! End-to-end rating flow against the development coprocessor and the Poseidon verifier.

use confidential_ledger::access::OperationalState;
use confidential_ledger::clear::ClearCoprocessor;
use confidential_ledger::client::RatingInputBuilder;
use confidential_ledger::events::LedgerEvent;
use confidential_ledger::types::{Address, Category, ExternalInput, Handle, RatingSubmission, Scope, StatisticsView};
use confidential_ledger::verifier::{InputAttestor, PoseidonInputVerifier};
use confidential_ledger::{CallContext, Ledger, LedgerConfig, LedgerError, LedgerMode};

const ADMIN: Address = Address([0xad; 20]);
const LEDGER: Address = Address([0x1e; 20]);
const OTHER_LEDGER: Address = Address([0x2e; 20]);
const ALICE: Address = Address([0xa1; 20]);
const BOB: Address = Address([0xb0; 20]);

struct Harness {
    ledger: Ledger,
    cp: ClearCoprocessor,
    verifier: PoseidonInputVerifier,
    clock: u64,
}

impl Harness {
    fn new() -> Self {
        let mut h = Self {
            ledger: Ledger::new(LedgerConfig {
                administrator: ADMIN,
                ledger_address: LEDGER,
                mode: LedgerMode::MultiFacility,
            }),
            cp: ClearCoprocessor::with_seed([42u8; 32]),
            verifier: PoseidonInputVerifier::from_key_hex("0x0123456789abcdef").unwrap(),
            clock: 1_700_000_000,
        };
        let ctx = h.ctx(ADMIN);
        h.ledger.create_facility(&ctx, "Test Hospital", "Test Location").unwrap();
        h
    }

    fn ctx(&mut self, who: Address) -> CallContext {
        self.clock += 12;
        CallContext::new(who, self.clock)
    }

    fn seal(&mut self, who: Address, scores: [u32; 6]) -> RatingSubmission {
        RatingInputBuilder::new(who, LEDGER).scores(scores).encrypt(&mut self.cp, &self.verifier).unwrap()
    }

    fn submit(&mut self, who: Address, facility: u64, scores: [u32; 6]) -> Result<(), LedgerError> {
        let submission = self.seal(who, scores);
        let ctx = self.ctx(who);
        self.ledger.submit_rating(&ctx, &mut self.cp, &self.verifier, Some(facility), &submission)
    }

    fn open(&self, h: Handle) -> u32 {
        self.cp.public_decrypt(&h).unwrap()
    }

    fn count(&self, scope: Scope) -> u32 {
        self.open(self.ledger.statistics(scope).unwrap().count)
    }

    fn sum(&self, scope: Scope, category: Category) -> u32 {
        self.open(self.ledger.statistics(scope).unwrap().sum(category))
    }
}

#[test]
fn hospital_rating_scenario() {
    let mut h = Harness::new();
    assert_eq!(h.ledger.all_facility_ids(), vec![1]);

    h.submit(ALICE, 1, [8, 7, 9, 6, 8, 7]).unwrap();
    assert!(h.ledger.has_submitted_to(ALICE, 1));
    assert!(h.ledger.has_submitted(ALICE));
    assert_eq!(h.count(Scope::Global), 1);
    assert_eq!(h.sum(Scope::Global, Category::Service), 8);

    let err = h.submit(ALICE, 1, [8, 7, 9, 6, 8, 7]).unwrap_err();
    assert!(matches!(err, LedgerError::DuplicateSubmission(_)));
    assert_eq!(h.count(Scope::Global), 1);

    h.submit(BOB, 1, [5, 5, 5, 5, 5, 5]).unwrap();
    assert_eq!(h.count(Scope::Global), 2);
    assert_eq!(h.sum(Scope::Global, Category::Service), 13);

    let ctx = h.ctx(ADMIN);
    assert_eq!(h.ledger.create_facility(&ctx, "Second Hospital", "456 Oak Ave").unwrap(), 2);
    h.submit(ALICE, 2, [9, 8, 9, 7, 9, 8]).unwrap();
    assert_eq!(h.count(Scope::Global), 3);
    assert_eq!(h.count(Scope::Facility(2)), 1);
    assert_eq!(h.count(Scope::Facility(1)), 2);
    assert!(h.ledger.has_submitted_to(ALICE, 2));

    assert!(matches!(h.submit(ALICE, 999, [1, 1, 1, 1, 1, 1]), Err(LedgerError::InvalidFacility(_))));
    assert_eq!(h.count(Scope::Global), 3);
}

#[test]
fn total_score_tracks_every_category() {
    let mut h = Harness::new();
    h.submit(ALICE, 1, [8, 7, 9, 6, 8, 7]).unwrap();
    h.submit(BOB, 1, [5, 5, 5, 5, 5, 5]).unwrap();

    let stats: StatisticsView = h.ledger.facility_statistics(1).unwrap();
    assert_eq!(h.open(stats.sum_total), 45 + 30);
    assert_eq!(h.open(stats.sum_doctor), 14);
    assert_eq!(h.open(stats.sum_guidance), 12);
}

#[test]
fn facility_registry_listing() {
    let mut h = Harness::new();
    for (n, l) in [("Hospital A", "Location A"), ("Hospital B", "Location B")] {
        let ctx = h.ctx(ADMIN);
        h.ledger.create_facility(&ctx, n, l).unwrap();
    }
    assert_eq!(h.ledger.all_facility_ids(), vec![1, 2, 3]);
    assert_eq!(h.ledger.total_facilities(), 3);

    let f = h.ledger.facility(2).unwrap();
    assert_eq!((f.name.as_str(), f.location.as_str(), f.is_active), ("Hospital A", "Location A", true));
    assert_eq!(h.ledger.facility(999), Err(LedgerError::NotFound(999)));

    let ctx = h.ctx(ADMIN);
    h.ledger.deactivate_facility(&ctx, 2).unwrap();
    assert_eq!(h.ledger.active_facility_ids(), vec![1, 3]);
    assert_eq!(h.ledger.all_facility_ids(), vec![1, 2, 3]);
}

#[test]
fn non_admin_cannot_create_facilities() {
    let mut h = Harness::new();
    let before = h.ledger.clone();
    let ctx = h.ctx(ALICE);
    assert_eq!(
        h.ledger.create_facility(&ctx, "Unauthorized Hospital", "Somewhere"),
        Err(LedgerError::Unauthorized { caller: ALICE })
    );
    assert_eq!(h.ledger, before);
}

#[test]
fn deactivated_facility_rejects_until_reactivated() {
    let mut h = Harness::new();
    let ctx = h.ctx(ADMIN);
    h.ledger.deactivate_facility(&ctx, 1).unwrap();

    assert!(matches!(h.submit(ALICE, 1, [1, 2, 3, 4, 5, 6]), Err(LedgerError::InvalidFacility(_))));
    assert!(!h.ledger.has_submitted(ALICE));

    let ctx = h.ctx(ADMIN);
    h.ledger.reactivate_facility(&ctx, 1).unwrap();
    h.submit(ALICE, 1, [1, 2, 3, 4, 5, 6]).unwrap();
    assert_eq!(h.count(Scope::Facility(1)), 1);
}

#[test]
fn stop_blocks_every_mutation_and_resume_restores_it() {
    let mut h = Harness::new();
    h.submit(ALICE, 1, [1, 1, 1, 1, 1, 1]).unwrap();

    let ctx = h.ctx(ADMIN);
    h.ledger.stop(&ctx).unwrap();
    assert_eq!(h.ledger.operational_state(), OperationalState::Stopped);
    let frozen = h.ledger.clone();

    assert!(matches!(h.submit(BOB, 1, [2, 2, 2, 2, 2, 2]), Err(LedgerError::InvalidState(_))));
    let ctx = h.ctx(ADMIN);
    assert!(matches!(h.ledger.create_facility(&ctx, "X", "Y"), Err(LedgerError::InvalidState(_))));
    assert!(matches!(h.ledger.deactivate_facility(&ctx, 1), Err(LedgerError::InvalidState(_))));
    assert!(matches!(h.ledger.reactivate_facility(&ctx, 1), Err(LedgerError::InvalidState(_))));
    assert!(matches!(h.ledger.stop(&ctx), Err(LedgerError::InvalidState(_))));
    let ctx = h.ctx(BOB);
    assert_eq!(h.ledger.resume(&ctx), Err(LedgerError::Unauthorized { caller: BOB }));
    assert_eq!(h.ledger, frozen);

    let ctx = h.ctx(ADMIN);
    h.ledger.resume(&ctx).unwrap();
    assert!(matches!(h.ledger.resume(&ctx), Err(LedgerError::InvalidState(_))));

    h.submit(BOB, 1, [2, 2, 2, 2, 2, 2]).unwrap();
    assert_eq!(h.count(Scope::Global), 2);
    assert!(matches!(h.submit(ALICE, 1, [1, 1, 1, 1, 1, 1]), Err(LedgerError::DuplicateSubmission(_))));
}

#[test]
fn replayed_ciphertext_from_another_sender_is_rejected() {
    let mut h = Harness::new();
    let alices = h.seal(ALICE, [9, 9, 9, 9, 9, 9]);
    let before = h.ledger.clone();

    let ctx = h.ctx(BOB);
    let err = h.ledger.submit_rating(&ctx, &mut h.cp, &h.verifier, Some(1), &alices).unwrap_err();
    assert!(matches!(err, LedgerError::InvalidProof(ref m) if m.starts_with("identity")));
    assert_eq!(h.ledger, before);
    assert!(!h.ledger.has_submitted(BOB));
}

#[test]
fn ciphertext_sealed_for_another_ledger_is_rejected() {
    let mut h = Harness::new();
    let foreign = RatingInputBuilder::new(ALICE, OTHER_LEDGER)
        .scores([3, 3, 3, 3, 3, 3])
        .encrypt(&mut h.cp, &h.verifier)
        .unwrap();

    let ctx = h.ctx(ALICE);
    let err = h.ledger.submit_rating(&ctx, &mut h.cp, &h.verifier, Some(1), &foreign).unwrap_err();
    assert!(matches!(err, LedgerError::InvalidProof(_)));
}

#[test]
fn one_bad_proof_rejects_the_whole_submission() {
    let mut h = Harness::new();
    let mut submission = h.seal(ALICE, [4, 4, 4, 4, 4, 4]);
    submission.scores[Category::Environment.index()].proof[0] ^= 0x01;
    let before = h.ledger.clone();

    let ctx = h.ctx(ALICE);
    let err = h.ledger.submit_rating(&ctx, &mut h.cp, &h.verifier, Some(1), &submission).unwrap_err();
    assert!(matches!(err, LedgerError::InvalidProof(_)));
    assert_eq!(h.ledger, before);
    assert_eq!(h.count(Scope::Global), 0);

    // The participant can still submit a well-formed rating afterwards.
    h.submit(ALICE, 1, [4, 4, 4, 4, 4, 4]).unwrap();
}

#[test]
fn attested_handle_the_coprocessor_never_issued_is_rejected() {
    let mut h = Harness::new();
    let mut submission = h.seal(ALICE, [6, 6, 6, 6, 6, 6]);
    let stray = Handle([0x77; 32]);
    submission.scores[Category::Doctor.index()] =
        ExternalInput { handle: stray, proof: h.verifier.attest(&stray, ALICE, LEDGER).unwrap() };
    let before = h.ledger.clone();

    let ctx = h.ctx(ALICE);
    let err = h.ledger.submit_rating(&ctx, &mut h.cp, &h.verifier, Some(1), &submission).unwrap_err();
    assert!(matches!(err, LedgerError::InvalidProof(ref m) if m.starts_with("doctor") && m.contains("unknown")));
    assert_eq!(h.ledger, before);
    assert!(!h.ledger.has_submitted(ALICE));
    assert_eq!(h.count(Scope::Global), 0);
}

#[test]
fn retained_ciphertexts_do_not_accumulate_history() {
    let mut h = Harness::new();
    h.cp.take_changes();

    let mut deltas = Vec::new();
    for i in 0..10u8 {
        h.submit(Address::repeat_byte(0x30 + i), 1, [1, 2, 3, 4, 5, 6]).unwrap();
        let d = h.cp.take_changes();
        deltas.push((d.upserted.len(), d.removed.len()));
    }

    // Seven inputs per rating, plus one global and one facility aggregate of eight handles each.
    assert_eq!(h.cp.len(), 7 * 10 + 16);
    assert_eq!(deltas[0], (7 + 16, 0));
    assert!(deltas[1..].iter().all(|d| *d == (7 + 16, 16)), "{deltas:?}");
    assert_eq!(h.count(Scope::Global), 10);
    assert_eq!(h.sum(Scope::Facility(1), Category::Guidance), 60);
}

#[test]
fn events_record_each_transition_in_order() {
    let mut h = Harness::new();
    h.submit(ALICE, 1, [1, 2, 3, 4, 5, 6]).unwrap();
    let ctx = h.ctx(ADMIN);
    h.ledger.stop(&ctx).unwrap();
    let ctx = h.ctx(ADMIN);
    h.ledger.resume(&ctx).unwrap();

    let kinds: Vec<_> = h.ledger.events().iter().map(|r| r.event.kind()).collect();
    assert_eq!(
        kinds,
        vec!["facility_created", "rating_submitted", "statistics_updated", "emergency_stop", "contract_resumed"]
    );

    match &h.ledger.events()[0].event {
        LedgerEvent::FacilityCreated { facility_id, name, creator, .. } => {
            assert_eq!((*facility_id, name.as_str(), *creator), (1, "Test Hospital", ADMIN));
        }
        other => panic!("unexpected first event {other:?}"),
    }
    match &h.ledger.events()[1].event {
        LedgerEvent::RatingSubmitted { participant, facility_id, .. } => {
            assert_eq!((*participant, *facility_id), (ALICE, Some(1)));
        }
        other => panic!("unexpected event {other:?}"),
    }

    let stamps: Vec<_> = h.ledger.events().iter().map(|r| r.event.timestamp()).collect();
    assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(h.ledger.events_since(3).len(), 2);
    assert_eq!(h.ledger.version(), 4);
}

#[test]
fn aggregates_stay_ciphertext_and_are_publicly_decryptable() {
    let mut h = Harness::new();
    h.submit(ALICE, 1, [8, 7, 9, 6, 8, 7]).unwrap();

    let agg = h.ledger.aggregate(Scope::Global).unwrap().clone();
    for handle in agg.handles() {
        assert!(h.cp.is_publicly_decryptable(handle));
        assert!(!handle.is_uninitialized());
    }
    // An untouched facility keeps the uninitialized sentinel, which reads as zero.
    let ctx = h.ctx(ADMIN);
    h.ledger.create_facility(&ctx, "Empty", "Nowhere").unwrap();
    assert!(h.ledger.facility_statistics(2).unwrap().count.is_uninitialized());
    assert_eq!(h.count(Scope::Facility(2)), 0);
}
