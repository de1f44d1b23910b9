use crate::errors::ApiError;
use confidential_ledger::types::Address;
use confidential_ledger::LedgerMode;
use std::path::PathBuf;

const DEFAULT_ADDR: &str = "127.0.0.1:8080";
const DEFAULT_DATA_DIR: &str = "data";
const DEFAULT_ADMIN: &str = "0x00000000000000000000000000000000000000ad";
const DEFAULT_LEDGER_ADDRESS: &str = "0x000000000000000000000000000000000000001e";
const DEFAULT_VERIFIER_KEY: &str = "0x5eed";
const DEFAULT_ADMIN_KEY: &str = "dev-admin-key";

/// API keys and the account each one acts as.
///
/// A request's caller is whatever account its key maps to; there is no other way to
/// name one.
#[derive(Clone, Default)]
pub struct Credentials {
    accounts: Vec<(String, Address)>,
}

/// Constant-time string comparison, so key checks do not leak prefixes.
fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes().zip(b.bytes()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

impl Credentials {
    pub fn from_pairs(pairs: impl IntoIterator<Item = (String, Address)>) -> Result<Self, ApiError> {
        let mut accounts: Vec<(String, Address)> = Vec::new();
        for (key, account) in pairs {
            if key.is_empty() {
                return Err(ApiError::Config(format!("empty API key for {account}")));
            }
            if accounts.iter().any(|(k, _)| *k == key) {
                return Err(ApiError::Config(format!("API key for {account} is also assigned to another account")));
            }
            accounts.push((key, account));
        }
        Ok(Self { accounts })
    }

    /// The account bound to `key`. Every stored key is compared.
    pub fn resolve(&self, key: &str) -> Option<Address> {
        self.accounts
            .iter()
            .fold(None, |found, (k, account)| if constant_time_eq(k, key) { Some(*account) } else { found })
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

// Keys are secrets; never print them.
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials").field("keys", &self.accounts.len()).finish()
    }
}

/// `key=0xaddr,key2=0xaddr2`; blank entries are skipped.
fn parse_participant_keys(raw: &str) -> Result<Vec<(String, Address)>, ApiError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (key, account) = entry
                .split_once('=')
                .ok_or_else(|| ApiError::Config("LEDGER_PARTICIPANT_KEYS entries must be key=address".to_string()))?;
            let account = account
                .trim()
                .parse()
                .map_err(|e| ApiError::Config(format!("LEDGER_PARTICIPANT_KEYS: {e}")))?;
            Ok((key.trim().to_string(), account))
        })
        .collect()
}

/// Process configuration, read from the environment.
#[derive(Clone, Debug)]
pub struct Config {
    pub addr: String,
    pub data_dir: PathBuf,
    pub administrator: Address,
    pub ledger_address: Address,
    pub mode: LedgerMode,
    pub verifier_key: String,
    pub credentials: Credentials,
}

impl Config {
    pub fn from_env() -> Result<Self, ApiError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ApiError> {
        let var = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());

        let administrator = var("LEDGER_ADMIN", DEFAULT_ADMIN)
            .parse()
            .map_err(|e| ApiError::Config(format!("LEDGER_ADMIN: {e}")))?;
        let ledger_address = var("LEDGER_ADDRESS", DEFAULT_LEDGER_ADDRESS)
            .parse()
            .map_err(|e| ApiError::Config(format!("LEDGER_ADDRESS: {e}")))?;

        let mode = match var("LEDGER_MODE", "multi").as_str() {
            "multi" => LedgerMode::MultiFacility,
            "single" => LedgerMode::SingleFacility,
            other => return Err(ApiError::Config(format!("LEDGER_MODE must be 'multi' or 'single', got '{other}'"))),
        };

        let mut keys = vec![(var("LEDGER_ADMIN_KEY", DEFAULT_ADMIN_KEY), administrator)];
        keys.extend(parse_participant_keys(&var("LEDGER_PARTICIPANT_KEYS", ""))?);
        let credentials = Credentials::from_pairs(keys)?;

        Ok(Self {
            addr: var("BACKEND_ADDR", DEFAULT_ADDR),
            data_dir: PathBuf::from(var("LEDGER_DATA_DIR", DEFAULT_DATA_DIR)),
            administrator,
            ledger_address,
            mode,
            verifier_key: var("LEDGER_VERIFIER_KEY", DEFAULT_VERIFIER_KEY),
            credentials,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let cfg = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg.addr, DEFAULT_ADDR);
        assert_eq!(cfg.mode, LedgerMode::MultiFacility);
        assert_eq!(cfg.administrator.to_string(), DEFAULT_ADMIN);
        assert_eq!(cfg.credentials.resolve(DEFAULT_ADMIN_KEY), Some(cfg.administrator));
        assert_eq!(cfg.credentials.len(), 1);
    }

    #[test]
    fn each_key_acts_as_its_own_account() {
        let cfg = Config::from_lookup(lookup(&[
            ("LEDGER_ADMIN_KEY", "root"),
            (
                "LEDGER_PARTICIPANT_KEYS",
                " alice=0x1111111111111111111111111111111111111111, ,bob=0x2222222222222222222222222222222222222222",
            ),
        ]))
        .unwrap();
        assert_eq!(cfg.credentials.resolve("root"), Some(cfg.administrator));
        assert_eq!(cfg.credentials.resolve("alice"), Some(Address::repeat_byte(0x11)));
        assert_eq!(cfg.credentials.resolve("bob"), Some(Address::repeat_byte(0x22)));
        assert_eq!(cfg.credentials.resolve(DEFAULT_ADMIN_KEY), None);
        assert!(!format!("{cfg:?}").contains("alice"));
    }

    #[test]
    fn ambiguous_or_malformed_keys_are_config_errors() {
        let cases = [
            ("LEDGER_PARTICIPANT_KEYS", "alice"),
            ("LEDGER_PARTICIPANT_KEYS", "alice=0x12"),
            ("LEDGER_PARTICIPANT_KEYS", "=0x1111111111111111111111111111111111111111"),
            ("LEDGER_PARTICIPANT_KEYS", "dev-admin-key=0x1111111111111111111111111111111111111111"),
            ("LEDGER_ADMIN_KEY", ""),
        ];
        for (name, value) in cases {
            assert!(
                matches!(Config::from_lookup(lookup(&[(name, value)])), Err(ApiError::Config(_))),
                "{name}={value}"
            );
        }
    }

    #[test]
    fn overrides_are_parsed() {
        let cfg = Config::from_lookup(lookup(&[
            ("LEDGER_MODE", "single"),
            ("LEDGER_ADMIN", "0x1111111111111111111111111111111111111111"),
            ("BACKEND_ADDR", "0.0.0.0:9000"),
        ]))
        .unwrap();
        assert_eq!(cfg.mode, LedgerMode::SingleFacility);
        assert_eq!(cfg.administrator, Address::repeat_byte(0x11));
        assert_eq!(cfg.addr, "0.0.0.0:9000");
    }

    #[test]
    fn bad_values_are_config_errors() {
        assert!(matches!(Config::from_lookup(lookup(&[("LEDGER_MODE", "both")])), Err(ApiError::Config(_))));
        assert!(matches!(Config::from_lookup(lookup(&[("LEDGER_ADMIN", "0x12")])), Err(ApiError::Config(_))));
    }
}
