//! Client-side sealing of a rating.
//!
//! Range checks live here, before encryption: once a score is sealed the ledger has no
//! way to compare it against bounds.

use crate::clear::ClearCoprocessor;
use crate::constants::{CATEGORY_COUNT, MAX_SCORE, MIN_SCORE};
use crate::errors::{LedgerError, LedgerResult};
use crate::types::{Address, Category, RatingSubmission};
use crate::verifier::InputAttestor;

/// Identity placeholder sealed alongside the scores when the caller supplies none.
pub const DEFAULT_IDENTITY: u32 = 1;

#[derive(Clone, Debug)]
pub struct RatingInputBuilder {
    sender: Address,
    ledger: Address,
    identity: u32,
    scores: [Option<u32>; CATEGORY_COUNT],
}

impl RatingInputBuilder {
    pub fn new(sender: Address, ledger: Address) -> Self {
        Self { sender, ledger, identity: DEFAULT_IDENTITY, scores: [None; CATEGORY_COUNT] }
    }

    pub fn identity(mut self, identity: u32) -> Self {
        self.identity = identity;
        self
    }

    pub fn score(mut self, category: Category, value: u32) -> Self {
        self.scores[category.index()] = Some(value);
        self
    }

    /// Set every category at once, in [`Category::ALL`] order.
    pub fn scores(mut self, values: [u32; CATEGORY_COUNT]) -> Self {
        self.scores = values.map(Some);
        self
    }

    fn checked_scores(&self) -> LedgerResult<[u32; CATEGORY_COUNT]> {
        let mut out = [0u32; CATEGORY_COUNT];
        for category in Category::ALL {
            let value = self.scores[category.index()]
                .ok_or_else(|| LedgerError::InvalidInput(format!("missing {category} score")))?;
            if !(MIN_SCORE..=MAX_SCORE).contains(&value) {
                return Err(LedgerError::InvalidInput(format!(
                    "{category} score {value} outside {MIN_SCORE}..={MAX_SCORE}"
                )));
            }
            out[category.index()] = value;
        }
        Ok(out)
    }

    /// Range-check, then seal every value through `coprocessor` with proofs from
    /// `attestor`. Nothing is sealed if any score is missing or out of range.
    pub fn encrypt<A: InputAttestor>(
        self,
        coprocessor: &mut ClearCoprocessor,
        attestor: &A,
    ) -> LedgerResult<RatingSubmission> {
        let values = self.checked_scores()?;

        let identity = coprocessor.encrypt_input(attestor, self.identity, self.sender, self.ledger)?;

        let mut sealed = Vec::with_capacity(CATEGORY_COUNT);
        for value in values {
            sealed.push(coprocessor.encrypt_input(attestor, value, self.sender, self.ledger)?);
        }
        let scores = sealed
            .try_into()
            .map_err(|_| LedgerError::InvalidInput("category count mismatch".to_string()))?;

        Ok(RatingSubmission { identity, scores })
    }
}
