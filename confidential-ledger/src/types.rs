//! Types shared between the ledger components, the validators and the host.

use crate::constants::CATEGORY_COUNT;
use crate::errors::LedgerError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const ADDRESS_LEN: usize = 20;
pub const HANDLE_LEN: usize = 32;

/// Sequential facility identifier, starting at 1.
pub type FacilityId = u64;

/// Ledger time in seconds.
pub type Timestamp = u64;

fn decode_hex_exact<const N: usize>(s: &str, what: &str) -> Result<[u8; N], LedgerError> {
    let raw = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(raw).map_err(|e| LedgerError::InvalidInput(format!("invalid {what} hex: {e}")))?;
    bytes
        .try_into()
        .map_err(|b: Vec<u8>| LedgerError::InvalidInput(format!("{what} must be {N} bytes, got {}", b.len())))
}

/// An account identifier (participant, administrator or ledger instance).
///
/// Serialized as `0x`-prefixed lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(pub [u8; ADDRESS_LEN]);

impl Address {
    pub const ZERO: Address = Address([0u8; ADDRESS_LEN]);

    pub fn repeat_byte(b: u8) -> Self {
        Self([b; ADDRESS_LEN])
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

impl FromStr for Address {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_hex_exact::<ADDRESS_LEN>(s, "address").map(Self)
    }
}

impl TryFrom<String> for Address {
    type Error = LedgerError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Address> for String {
    fn from(a: Address) -> Self {
        a.to_string()
    }
}

/// Opaque reference to a sealed value held by the coprocessor.
///
/// The all-zero handle is the "uninitialized" sentinel: an aggregate nobody has
/// contributed to yet. It reads as zero when decrypted.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Handle(pub [u8; HANDLE_LEN]);

impl Handle {
    pub const ZERO: Handle = Handle([0u8; HANDLE_LEN]);

    pub fn is_uninitialized(&self) -> bool {
        *self == Self::ZERO
    }

    pub fn as_bytes(&self) -> &[u8; HANDLE_LEN] {
        &self.0
    }

    /// First four bytes in hex, for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({}..)", self.short())
    }
}

impl FromStr for Handle {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_hex_exact::<HANDLE_LEN>(s, "handle").map(Self)
    }
}

impl TryFrom<String> for Handle {
    type Error = LedgerError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Handle> for String {
    fn from(h: Handle) -> Self {
        h.to_string()
    }
}

/// The closed set of rated categories, in submission order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Service,
    Medicine,
    Doctor,
    Facility,
    Environment,
    Guidance,
}

impl Category {
    pub const ALL: [Category; CATEGORY_COUNT] = [
        Category::Service,
        Category::Medicine,
        Category::Doctor,
        Category::Facility,
        Category::Environment,
        Category::Guidance,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Service => "service",
            Category::Medicine => "medicine",
            Category::Doctor => "doctor",
            Category::Facility => "facility",
            Category::Environment => "environment",
            Category::Guidance => "guidance",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A sealed value as it arrives from a client: the handle plus the proof binding it to
/// (sender, ledger).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExternalInput {
    pub handle: Handle,
    pub proof: Vec<u8>,
}

/// One participant's rating: an identity placeholder and one sealed score per category.
///
/// `scores` is indexed by [`Category::index`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RatingSubmission {
    pub identity: ExternalInput,
    pub scores: [ExternalInput; CATEGORY_COUNT],
}

impl RatingSubmission {
    pub fn score(&self, category: Category) -> &ExternalInput {
        &self.scores[category.index()]
    }
}

/// A registered facility. Never deleted; deactivation is the only removal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Facility {
    pub id: FacilityId,
    pub name: String,
    pub location: String,
    pub created_at: Timestamp,
    pub is_active: bool,
}

/// Which aggregate a read refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Scope {
    Global,
    Facility(FacilityId),
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Global => f.write_str("global"),
            Scope::Facility(id) => write!(f, "facility {id}"),
        }
    }
}

/// Ciphertext handles of one aggregate, with categories named.
///
/// Never carries plaintext. Consumers decrypt through the coprocessor.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatisticsView {
    pub count: Handle,
    pub sum_service: Handle,
    pub sum_medicine: Handle,
    pub sum_doctor: Handle,
    pub sum_facility: Handle,
    pub sum_environment: Handle,
    pub sum_guidance: Handle,
    pub sum_total: Handle,
}

impl StatisticsView {
    pub fn sum(&self, category: Category) -> Handle {
        match category {
            Category::Service => self.sum_service,
            Category::Medicine => self.sum_medicine,
            Category::Doctor => self.sum_doctor,
            Category::Facility => self.sum_facility,
            Category::Environment => self.sum_environment,
            Category::Guidance => self.sum_guidance,
        }
    }
}
