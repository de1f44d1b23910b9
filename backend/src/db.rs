use crate::errors::ApiError;
use chrono::Utc;
use confidential_ledger::clear::{ClearCoprocessor, CoprocessorDelta, SealedEntry};
use confidential_ledger::events::{EventRecord, LedgerEvent};
use confidential_ledger::types::{Address, Handle};
use confidential_ledger::Ledger;
use sqlx::{sqlite::SqlitePoolOptions, Pool, Row, Sqlite};
use std::collections::BTreeSet;

pub type Db = Pool<Sqlite>;

/// State loaded back from the database on startup.
pub struct Snapshot {
    pub ledger: Ledger,
    pub coprocessor: ClearCoprocessor,
}

fn unreadable(what: &'static str, e: impl std::fmt::Display) -> ApiError {
    tracing::error!(error = %e, what, "stored state is unreadable");
    ApiError::Internal
}

pub async fn connect(db_url: &str, max_connections: u32) -> Result<Db, ApiError> {
    SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect(db_url)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "sqlite connect failed");
            ApiError::Internal
        })
}

pub async fn init_schema(db: &Db) -> Result<(), ApiError> {
    // ledger_state holds exactly one row with the registry and current aggregates.
    // ciphertexts and events are written incrementally, one row per handle or event.
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS ledger_state (
  id INTEGER PRIMARY KEY CHECK (id = 1),
  version INTEGER NOT NULL,
  updated_at TEXT NOT NULL,
  ledger_json TEXT NOT NULL,
  coprocessor_seed BLOB NOT NULL,
  handles_issued INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS ciphertexts (
  handle TEXT PRIMARY KEY,
  value INTEGER NOT NULL,
  allowed_json TEXT NOT NULL,
  public INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS events (
  seq INTEGER PRIMARY KEY,
  version INTEGER NOT NULL,
  kind TEXT NOT NULL,
  payload_json TEXT NOT NULL,
  created_at TEXT NOT NULL
);
"#,
    )
    .execute(db)
    .await
    .map_err(|_| ApiError::Internal)?;

    Ok(())
}

pub async fn load_snapshot(db: &Db) -> Result<Option<Snapshot>, ApiError> {
    let row = sqlx::query(
        r#"SELECT ledger_json, coprocessor_seed, handles_issued FROM ledger_state WHERE id = 1"#,
    )
    .fetch_optional(db)
    .await
    .map_err(|_| ApiError::Internal)?;

    let Some(row) = row else {
        return Ok(None);
    };

    let ledger_json: String = row.get(0);
    let seed: Vec<u8> = row.get(1);
    let issued: i64 = row.get(2);

    let mut ledger: Ledger = serde_json::from_str(&ledger_json).map_err(|e| unreadable("ledger_state", e))?;
    let seed: [u8; 32] = seed
        .try_into()
        .map_err(|v: Vec<u8>| unreadable("coprocessor_seed", format!("{} bytes", v.len())))?;

    let rows = sqlx::query(r#"SELECT handle, value, allowed_json, public FROM ciphertexts"#)
        .fetch_all(db)
        .await
        .map_err(|_| ApiError::Internal)?;
    let mut entries = Vec::with_capacity(rows.len());
    for row in rows {
        let handle: String = row.get(0);
        let handle: Handle = handle.parse().map_err(|e| unreadable("ciphertexts.handle", e))?;
        let allowed_json: String = row.get(2);
        let allowed: BTreeSet<Address> =
            serde_json::from_str(&allowed_json).map_err(|e| unreadable("ciphertexts.allowed_json", e))?;
        let value: i64 = row.get(1);
        let value = u32::try_from(value).map_err(|e| unreadable("ciphertexts.value", e))?;
        entries.push((handle, SealedEntry { value, allowed, public: row.get::<i64, _>(3) != 0 }));
    }
    let coprocessor = ClearCoprocessor::restore(seed, issued as u64, entries);

    let rows = sqlx::query(r#"SELECT seq, version, payload_json FROM events ORDER BY seq"#)
        .fetch_all(db)
        .await
        .map_err(|_| ApiError::Internal)?;
    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        let payload_json: String = row.get(2);
        let event: LedgerEvent =
            serde_json::from_str(&payload_json).map_err(|e| unreadable("events.payload_json", e))?;
        records.push(EventRecord { seq: row.get::<i64, _>(0) as u64, version: row.get::<i64, _>(1) as u64, event });
    }
    ledger.restore_history(records).map_err(|e| unreadable("events", e))?;

    Ok(Some(Snapshot { ledger, coprocessor }))
}

/// Write one commit in one transaction: the ledger row, the coprocessor's changed
/// handles, and the events the commit added.
pub async fn persist(
    db: &Db,
    ledger: &Ledger,
    coprocessor: &ClearCoprocessor,
    delta: &CoprocessorDelta,
    new_events: &[EventRecord],
) -> Result<(), ApiError> {
    let now = Utc::now().to_rfc3339();
    let ledger_json = serde_json::to_string(ledger).map_err(|_| ApiError::Internal)?;

    let mut tx = db.begin().await.map_err(|_| ApiError::Internal)?;

    sqlx::query(
        r#"INSERT OR REPLACE INTO ledger_state (id, version, updated_at, ledger_json, coprocessor_seed, handles_issued)
           VALUES (1, ?, ?, ?, ?, ?)"#,
    )
    .bind(ledger.version() as i64)
    .bind(&now)
    .bind(ledger_json)
    .bind(coprocessor.seed().to_vec())
    .bind(delta.issued as i64)
    .execute(&mut *tx)
    .await
    .map_err(|_| ApiError::Internal)?;

    for (handle, entry) in &delta.upserted {
        let allowed_json = serde_json::to_string(&entry.allowed).map_err(|_| ApiError::Internal)?;
        sqlx::query(
            r#"INSERT OR REPLACE INTO ciphertexts (handle, value, allowed_json, public)
               VALUES (?, ?, ?, ?)"#,
        )
        .bind(handle.to_string())
        .bind(i64::from(entry.value))
        .bind(allowed_json)
        .bind(i64::from(entry.public))
        .execute(&mut *tx)
        .await
        .map_err(|_| ApiError::Internal)?;
    }

    for handle in &delta.removed {
        sqlx::query(r#"DELETE FROM ciphertexts WHERE handle = ?"#)
            .bind(handle.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|_| ApiError::Internal)?;
    }

    for record in new_events {
        let payload_json = serde_json::to_string(&record.event).map_err(|_| ApiError::Internal)?;
        sqlx::query(
            r#"INSERT INTO events (seq, version, kind, payload_json, created_at)
               VALUES (?, ?, ?, ?, ?)"#,
        )
        .bind(record.seq as i64)
        .bind(record.version as i64)
        .bind(record.event.kind())
        .bind(payload_json)
        .bind(&now)
        .execute(&mut *tx)
        .await
        .map_err(|_| ApiError::Internal)?;
    }

    tx.commit().await.map_err(|_| ApiError::Internal)?;
    Ok(())
}

pub async fn count_events(db: &Db) -> Result<u64, ApiError> {
    let row = sqlx::query(r#"SELECT COUNT(*) AS c FROM events"#)
        .fetch_one(db)
        .await
        .map_err(|_| ApiError::Internal)?;

    let c: i64 = row.get("c");
    Ok(c as u64)
}
