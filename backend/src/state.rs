use crate::config::{Config, Credentials};
use crate::db::{self, Db};
use crate::errors::ApiError;
use chrono::Utc;
use confidential_ledger::clear::ClearCoprocessor;
use confidential_ledger::types::{Address, Timestamp};
use confidential_ledger::verifier::PoseidonInputVerifier;
use confidential_ledger::{CallContext, Ledger, LedgerConfig, LedgerResult};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Ledger time for a call: wall-clock seconds, never earlier than the last committed
/// event and never negative.
pub fn ledger_time(last: Option<Timestamp>, wall_secs: i64) -> Timestamp {
    let wall = u64::try_from(wall_secs).unwrap_or(0);
    last.map_or(wall, |last| wall.max(last))
}

/// Everything a ledger transaction may touch.
///
/// The coprocessor lives next to the ledger so that sealing, arithmetic and grants from
/// one request are persisted together with the ledger state they belong to.
#[derive(Debug)]
pub struct LedgerCore {
    pub ledger: Ledger,
    pub coprocessor: ClearCoprocessor,
}

impl LedgerCore {
    /// Call context for `caller` at the current ledger time.
    pub fn context(&self, caller: Address) -> CallContext {
        CallContext::new(caller, ledger_time(self.ledger.last_timestamp(), Utc::now().timestamp()))
    }
}

impl From<db::Snapshot> for LedgerCore {
    fn from(snap: db::Snapshot) -> Self {
        Self { ledger: snap.ledger, coprocessor: snap.coprocessor }
    }
}

#[derive(Debug)]
struct Shared {
    core: LedgerCore,
    /// Set when memory may have diverged from disk and could not be reloaded.
    poisoned: bool,
}

#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub credentials: Arc<Credentials>,
    verifier: Arc<PoseidonInputVerifier>,
    shared: Arc<Mutex<Shared>>,
}

impl AppState {
    /// Restore the last persisted state, or start a fresh ledger from `config`.
    pub async fn bootstrap(db: Db, config: &Config) -> Result<Self, ApiError> {
        let verifier = PoseidonInputVerifier::from_key_hex(&config.verifier_key)
            .map_err(|e| ApiError::Config(format!("LEDGER_VERIFIER_KEY: {e}")))?;

        let core = match db::load_snapshot(&db).await? {
            Some(snap) => {
                if snap.ledger.administrator() != config.administrator
                    || snap.ledger.ledger_address() != config.ledger_address
                {
                    tracing::warn!(
                        stored_admin = %snap.ledger.administrator(),
                        stored_ledger = %snap.ledger.ledger_address(),
                        "configured identities differ from stored state; keeping stored state"
                    );
                }
                tracing::info!(
                    version = snap.ledger.version(),
                    events = snap.ledger.events().len(),
                    ciphertexts = snap.coprocessor.len(),
                    "restored ledger state"
                );
                LedgerCore::from(snap)
            }
            None => {
                let ledger = Ledger::new(LedgerConfig {
                    administrator: config.administrator,
                    ledger_address: config.ledger_address,
                    mode: config.mode,
                });
                let mut coprocessor = ClearCoprocessor::new();
                let delta = coprocessor.take_changes();
                db::persist(&db, &ledger, &coprocessor, &delta, ledger.events()).await?;
                tracing::info!(admin = %config.administrator, mode = ?config.mode, "initialized new ledger");
                LedgerCore { ledger, coprocessor }
            }
        };
        tracing::info!(keys = config.credentials.len(), "credentials loaded");

        Ok(Self {
            db,
            credentials: Arc::new(config.credentials.clone()),
            verifier: Arc::new(verifier),
            shared: Arc::new(Mutex::new(Shared { core, poisoned: false })),
        })
    }

    pub async fn read<T>(&self, f: impl FnOnce(&LedgerCore) -> T) -> T {
        let shared = self.shared.lock().await;
        f(&shared.core)
    }

    /// Run one mutation under the lock, in place.
    ///
    /// Ledger operations change nothing when they fail, so a rejected call only has to
    /// roll the coprocessor back to its checkpoint. A committed call is written as a
    /// delta: the ledger row, the changed ciphertexts and the new events. If that write
    /// fails the in-memory state is reloaded from disk.
    pub async fn transact<T, F>(&self, f: F) -> Result<T, ApiError>
    where
        F: FnOnce(&mut LedgerCore, &PoseidonInputVerifier) -> LedgerResult<T>,
    {
        let mut shared = self.shared.lock().await;
        if shared.poisoned {
            tracing::error!("refusing to mutate: in-memory state could not be reconciled with storage");
            return Err(ApiError::Internal);
        }

        let seen = shared.core.ledger.events().len() as u64;
        let out = match f(&mut shared.core, &self.verifier) {
            Ok(out) => out,
            Err(e) => {
                shared.core.coprocessor.rollback();
                return Err(e.into());
            }
        };

        let delta = shared.core.coprocessor.take_changes();
        let core = &shared.core;
        let stored = db::persist(&self.db, &core.ledger, &core.coprocessor, &delta, core.ledger.events_since(seen)).await;

        if let Err(e) = stored {
            tracing::error!(version = shared.core.ledger.version(), "commit was not stored; reloading");
            match db::load_snapshot(&self.db).await {
                Ok(Some(snap)) => shared.core = LedgerCore::from(snap),
                _ => {
                    tracing::error!("reload failed; further mutations are refused");
                    shared.poisoned = true;
                }
            }
            return Err(e);
        }

        Ok(out)
    }
}
