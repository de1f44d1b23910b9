use crate::errors::ApiError;
use base64::Engine;
use chrono::{DateTime, Utc};
use confidential_ledger::access::OperationalState;
use confidential_ledger::events::EventRecord;
use confidential_ledger::types::{
    Address, Category, ExternalInput, Facility, FacilityId, Handle, RatingSubmission, StatisticsView,
};
use confidential_ledger::LedgerMode;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct LedgerInfoResponse {
    pub protocol_id: u64,
    pub administrator: Address,
    pub ledger_address: Address,
    pub mode: LedgerMode,
    pub state: OperationalState,
    pub total_facilities: u64,
    pub version: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FacilityCreateRequest {
    pub name: String,
    pub location: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FacilityCreateResponse {
    pub facility_id: FacilityId,
    pub version: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FacilityIdsResponse {
    pub facility_ids: Vec<FacilityId>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FacilityResponse {
    pub facility_id: FacilityId,
    pub name: String,
    pub location: String,
    /// Ledger time, seconds.
    pub created_at: u64,
    /// `created_at` rendered as UTC, when it is a representable instant.
    pub created_at_utc: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl From<&Facility> for FacilityResponse {
    fn from(f: &Facility) -> Self {
        Self {
            facility_id: f.id,
            name: f.name.clone(),
            location: f.location.clone(),
            created_at: f.created_at,
            created_at_utc: i64::try_from(f.created_at).ok().and_then(|s| DateTime::from_timestamp(s, 0)),
            is_active: f.is_active,
        }
    }
}

/// Result of a state-changing call that returns nothing else.
#[derive(Debug, Serialize, Deserialize)]
pub struct CommitResponse {
    pub state: OperationalState,
    pub version: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatisticsResponse {
    /// "global" or the facility id.
    pub scope: String,
    pub statistics: StatisticsView,
}

#[derive(Debug, Deserialize)]
pub struct SubmissionStatusParams {
    pub facility_id: Option<FacilityId>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmissionStatusResponse {
    pub participant: Address,
    pub has_submitted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facility_id: Option<FacilityId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_submitted_to_facility: Option<bool>,
}

/// A sealed value on the wire: hex handle plus base64 proof.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SealedInputDto {
    pub handle: Handle,
    pub proof_b64: String,
}

impl SealedInputDto {
    pub fn into_input(self, what: &str) -> Result<ExternalInput, ApiError> {
        let proof = base64::engine::general_purpose::STANDARD
            .decode(self.proof_b64.as_bytes())
            .map_err(|_| ApiError::BadRequest(format!("{what}: proof_b64 is not valid base64")))?;
        Ok(ExternalInput { handle: self.handle, proof })
    }
}

impl From<&ExternalInput> for SealedInputDto {
    fn from(input: &ExternalInput) -> Self {
        Self {
            handle: input.handle,
            proof_b64: base64::engine::general_purpose::STANDARD.encode(&input.proof),
        }
    }
}

/// One value per category, keyed by name.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CategoryScores<T> {
    pub service: T,
    pub medicine: T,
    pub doctor: T,
    pub facility: T,
    pub environment: T,
    pub guidance: T,
}

impl<T> CategoryScores<T> {
    pub fn into_array(self) -> [T; 6] {
        [self.service, self.medicine, self.doctor, self.facility, self.environment, self.guidance]
    }

    pub fn from_fn(mut f: impl FnMut(Category) -> T) -> Self {
        Self {
            service: f(Category::Service),
            medicine: f(Category::Medicine),
            doctor: f(Category::Doctor),
            facility: f(Category::Facility),
            environment: f(Category::Environment),
            guidance: f(Category::Guidance),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RatingSubmitRequest {
    /// Required in multi-facility mode, absent in single-facility mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facility_id: Option<FacilityId>,
    pub identity: SealedInputDto,
    pub scores: CategoryScores<SealedInputDto>,
}

impl RatingSubmitRequest {
    pub fn into_submission(self) -> Result<RatingSubmission, ApiError> {
        let identity = self.identity.into_input("identity")?;
        let [service, medicine, doctor, facility, environment, guidance] = self.scores.into_array();
        Ok(RatingSubmission {
            identity,
            scores: [
                service.into_input("service")?,
                medicine.into_input("medicine")?,
                doctor.into_input("doctor")?,
                facility.into_input("facility")?,
                environment.into_input("environment")?,
                guidance.into_input("guidance")?,
            ],
        })
    }

    pub fn from_submission(facility_id: Option<FacilityId>, s: &RatingSubmission) -> Self {
        Self {
            facility_id,
            identity: SealedInputDto::from(&s.identity),
            scores: CategoryScores::from_fn(|c| SealedInputDto::from(s.score(c))),
        }
    }
}

/// Development-only: plaintext scores to seal for the calling participant.
#[derive(Debug, Serialize, Deserialize)]
pub struct SealRatingRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facility_id: Option<FacilityId>,
    #[serde(default)]
    pub identity: Option<u32>,
    pub scores: CategoryScores<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DecryptRequest {
    pub handles: Vec<Handle>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DecryptedValue {
    pub handle: Handle,
    pub value: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DecryptResponse {
    pub values: Vec<DecryptedValue>,
}

#[derive(Debug, Deserialize)]
pub struct EventsParams {
    pub since: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EventsResponse {
    pub next_seq: u64,
    pub events: Vec<EventRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sealed(byte: u8) -> SealedInputDto {
        SealedInputDto {
            handle: Handle([byte; 32]),
            proof_b64: base64::engine::general_purpose::STANDARD.encode([byte; 3]),
        }
    }

    #[test]
    fn submit_request_maps_named_categories_to_submission_order() {
        let req = RatingSubmitRequest {
            facility_id: Some(1),
            identity: sealed(0),
            scores: CategoryScores::from_fn(|c| sealed(c.index() as u8 + 1)),
        };
        let submission = req.into_submission().unwrap();
        for c in Category::ALL {
            assert_eq!(submission.score(c).handle, Handle([c.index() as u8 + 1; 32]));
        }
        assert_eq!(submission.identity.proof, vec![0u8; 3]);
    }

    #[test]
    fn bad_base64_names_the_offending_input() {
        let mut scores = CategoryScores::from_fn(|_| sealed(1));
        scores.doctor.proof_b64 = "%%%".into();
        let req = RatingSubmitRequest { facility_id: None, identity: sealed(0), scores };

        match req.into_submission() {
            Err(ApiError::BadRequest(msg)) => assert!(msg.starts_with("doctor")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn submit_request_json_shape() {
        let json = serde_json::json!({
            "facility_id": 2,
            "identity": { "handle": format!("0x{}", "01".repeat(32)), "proof_b64": "AA==" },
            "scores": {
                "service": { "handle": format!("0x{}", "02".repeat(32)), "proof_b64": "AA==" },
                "medicine": { "handle": format!("0x{}", "03".repeat(32)), "proof_b64": "AA==" },
                "doctor": { "handle": format!("0x{}", "04".repeat(32)), "proof_b64": "AA==" },
                "facility": { "handle": format!("0x{}", "05".repeat(32)), "proof_b64": "AA==" },
                "environment": { "handle": format!("0x{}", "06".repeat(32)), "proof_b64": "AA==" },
                "guidance": { "handle": format!("0x{}", "07".repeat(32)), "proof_b64": "AA==" }
            }
        });
        let req: RatingSubmitRequest = serde_json::from_value(json).unwrap();
        assert_eq!(req.facility_id, Some(2));
        assert_eq!(req.scores.guidance.handle, Handle([7u8; 32]));
    }
}
