//! Validation of inbound sealed values.
//!
//! A proof binds a ciphertext handle to exactly one (sender, ledger) pair. A handle
//! sealed for another caller, or for another ledger instance, is rejected, which stops
//! replaying someone else's ciphertext.

use crate::constants::{poseidon_config, INPUT_BINDING_DOMAIN};
use crate::errors::{LedgerError, LedgerResult};
use crate::types::{Address, ExternalInput, Handle, ADDRESS_LEN, HANDLE_LEN};
use ark_bn254::Fr;
use ark_crypto_primitives::sponge::poseidon::{PoseidonConfig, PoseidonSponge};
use ark_crypto_primitives::sponge::CryptographicSponge;
use ark_ff::PrimeField;
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};

/// Checks that an inbound sealed value may be used by `sender` against `ledger`.
pub trait CiphertextValidator {
    fn validate(&self, input: &ExternalInput, sender: Address, ledger: Address) -> LedgerResult<Handle>;
}

/// Issues proofs for freshly sealed inputs. Held by whoever performs client-side sealing.
pub trait InputAttestor {
    fn attest(&self, handle: &Handle, sender: Address, ledger: Address) -> LedgerResult<Vec<u8>>;
}

/// Poseidon-keyed input verifier.
///
/// The proof is the compressed encoding of
/// `Poseidon(domain, key, handle_lo, handle_hi, sender, ledger)` over BN254::Fr.
/// Only holders of `key` can mint a proof, and every bound field is absorbed, so a
/// proof does not transfer to another handle, sender or ledger.
#[derive(Clone)]
pub struct PoseidonInputVerifier {
    key: Fr,
    cfg: PoseidonConfig<Fr>,
}

impl PoseidonInputVerifier {
    pub fn new(key: Fr) -> Self {
        Self { key, cfg: poseidon_config() }
    }

    /// Build from a hex-encoded key (little-endian, reduced mod r).
    pub fn from_key_hex(key_hex: &str) -> LedgerResult<Self> {
        let raw = key_hex.strip_prefix("0x").unwrap_or(key_hex);
        let bytes = hex::decode(raw).map_err(|e| LedgerError::InvalidInput(format!("invalid verifier key hex: {e}")))?;
        if bytes.is_empty() {
            return Err(LedgerError::InvalidInput("verifier key must not be empty".to_string()));
        }
        Ok(Self::new(Fr::from_le_bytes_mod_order(&bytes)))
    }

    fn binding(&self, handle: &Handle, sender: Address, ledger: Address) -> Fr {
        let (lo, hi) = handle.as_bytes().split_at(HANDLE_LEN / 2);

        let elems = [
            Fr::from(INPUT_BINDING_DOMAIN),
            self.key,
            Fr::from_le_bytes_mod_order(lo),
            Fr::from_le_bytes_mod_order(hi),
            Fr::from_le_bytes_mod_order(sender.as_bytes()),
            Fr::from_le_bytes_mod_order(ledger.as_bytes()),
        ];

        let mut sponge = PoseidonSponge::<Fr>::new(&self.cfg);
        sponge.absorb(&elems.as_slice());
        sponge.squeeze_field_elements::<Fr>(1)[0]
    }
}

impl InputAttestor for PoseidonInputVerifier {
    fn attest(&self, handle: &Handle, sender: Address, ledger: Address) -> LedgerResult<Vec<u8>> {
        let tag = self.binding(handle, sender, ledger);
        let mut out = Vec::new();
        tag.serialize_compressed(&mut out)
            .map_err(|e| LedgerError::Coprocessor(format!("proof serialization: {e}")))?;
        Ok(out)
    }
}

impl CiphertextValidator for PoseidonInputVerifier {
    fn validate(&self, input: &ExternalInput, sender: Address, ledger: Address) -> LedgerResult<Handle> {
        let presented = Fr::deserialize_compressed(&input.proof[..])
            .map_err(|_| LedgerError::InvalidProof(format!("malformed proof for handle {}", input.handle.short())))?;

        if presented != self.binding(&input.handle, sender, ledger) {
            return Err(LedgerError::InvalidProof(format!(
                "handle {} is not bound to sender {sender} on ledger {ledger}",
                input.handle.short()
            )));
        }

        Ok(input.handle)
    }
}

/// Deterministic, non-cryptographic validator for tests.
///
/// The proof is the plain concatenation `handle || sender || ledger`.
#[derive(Clone, Copy, Debug, Default)]
pub struct StubValidator;

impl StubValidator {
    pub fn proof_for(handle: &Handle, sender: Address, ledger: Address) -> Vec<u8> {
        let mut out = Vec::with_capacity(HANDLE_LEN + 2 * ADDRESS_LEN);
        out.extend_from_slice(handle.as_bytes());
        out.extend_from_slice(sender.as_bytes());
        out.extend_from_slice(ledger.as_bytes());
        out
    }
}

impl InputAttestor for StubValidator {
    fn attest(&self, handle: &Handle, sender: Address, ledger: Address) -> LedgerResult<Vec<u8>> {
        Ok(Self::proof_for(handle, sender, ledger))
    }
}

impl CiphertextValidator for StubValidator {
    fn validate(&self, input: &ExternalInput, sender: Address, ledger: Address) -> LedgerResult<Handle> {
        if input.proof != Self::proof_for(&input.handle, sender, ledger) {
            return Err(LedgerError::InvalidProof(format!(
                "stub binding mismatch for handle {}",
                input.handle.short()
            )));
        }
        Ok(input.handle)
    }
}
