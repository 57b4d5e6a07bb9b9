//! SQLite persistence layer: the durable result sink.
//!
//! RULE: Only the store talks to the database.
//! The ledger calls store methods through `ResultSink`; nothing else
//! executes SQL.

use crate::{
    engine::AllocationPosting,
    error::{AllocError, AllocResult},
    ledger::{AllocationResult, AllocationRun, ResultSink},
    money::Amount,
};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Connection;
use std::str::FromStr;

mod posting;
mod run;

pub struct AllocStore {
    conn: Connection,
}

impl AllocStore {
    pub fn open(path: &str) -> AllocResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> AllocResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> AllocResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_allocation.sql"))?;
        Ok(())
    }
}

impl ResultSink for AllocStore {
    fn insert_run(&mut self, run: &AllocationRun) -> AllocResult<()> {
        AllocStore::insert_run(self, run)
    }

    fn update_run(&mut self, run: &AllocationRun) -> AllocResult<()> {
        AllocStore::update_run(self, run)
    }

    fn save_input(&mut self, run_id: &str, input_json: &str) -> AllocResult<()> {
        AllocStore::save_input(self, run_id, input_json)
    }

    fn append_postings(
        &mut self,
        run_id: &str,
        first_seq: u64,
        postings: &[AllocationPosting],
    ) -> AllocResult<()> {
        AllocStore::append_postings(self, run_id, first_seq, postings)
    }

    fn complete_run(
        &mut self,
        run: &AllocationRun,
        results: &[AllocationResult],
    ) -> AllocResult<()> {
        AllocStore::complete_run(self, run, results)
    }
}

// ── Column codecs ─────────────────────────────────────────────

fn time_to_sql(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn time_from_sql(text: &str) -> AllocResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| AllocError::Other(anyhow::anyhow!("bad timestamp '{text}': {e}")))
}

fn amount_from_sql(text: &str) -> AllocResult<Amount> {
    Amount::from_str(text).map_err(|_| AllocError::InvalidAmount(text.to_string()))
}
