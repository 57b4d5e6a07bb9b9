use super::{amount_from_sql, run::set_status, AllocStore};
use crate::{
    engine::AllocationPosting,
    error::AllocResult,
    ledger::{AllocationResult, AllocationRun},
    money::format_amount,
};
use rusqlite::params;

impl AllocStore {
    // ── Postings ──────────────────────────────────────────────────

    /// Append to a run's log. Rows already present at the same seq are kept,
    /// so replaying a batch after a crash is harmless.
    pub fn append_postings(
        &self,
        run_id: &str,
        first_seq: u64,
        postings: &[AllocationPosting],
    ) -> AllocResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO allocation_posting
                    (run_id, seq, iteration_no, parent_code, child_code, amount)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for (offset, p) in postings.iter().enumerate() {
                stmt.execute(params![
                    run_id,
                    (first_seq + offset as u64) as i64,
                    p.iteration_no as i64,
                    p.parent_code,
                    p.child_code,
                    format_amount(p.amount),
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn postings_for_run(&self, run_id: &str) -> AllocResult<Vec<AllocationPosting>> {
        let mut stmt = self.conn.prepare(
            "SELECT iteration_no, parent_code, child_code, amount
             FROM allocation_posting WHERE run_id = ?1
             ORDER BY seq ASC",
        )?;
        let rows = stmt
            .query_map(params![run_id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(iteration_no, parent_code, child_code, amount)| {
                Ok(AllocationPosting {
                    iteration_no: iteration_no as u32,
                    parent_code,
                    child_code,
                    amount: amount_from_sql(&amount)?,
                })
            })
            .collect()
    }

    pub fn posting_count(&self, run_id: &str) -> AllocResult<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM allocation_posting WHERE run_id = ?1",
            params![run_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // ── Results ───────────────────────────────────────────────────

    /// Result rows and the completed status commit together. A run that is
    /// no longer running rolls the whole write back.
    pub fn complete_run(
        &self,
        run: &AllocationRun,
        results: &[AllocationResult],
    ) -> AllocResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO allocation_result (run_id, account_code, amount)
                 VALUES (?1, ?2, ?3)",
            )?;
            for r in results {
                stmt.execute(params![run.run_id, r.account_code, format_amount(r.amount)])?;
            }
        }
        if set_status(&tx, run)? == 0 {
            drop(tx);
            return Err(self.not_running(&run.run_id)?);
        }
        tx.commit()?;
        Ok(())
    }

    pub fn results_for_run(&self, run_id: &str) -> AllocResult<Vec<AllocationResult>> {
        let mut stmt = self.conn.prepare(
            "SELECT account_code, amount FROM allocation_result
             WHERE run_id = ?1 ORDER BY account_code ASC",
        )?;
        let rows = stmt
            .query_map(params![run_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(account_code, amount)| {
                Ok(AllocationResult {
                    account_code,
                    amount: amount_from_sql(&amount)?,
                })
            })
            .collect()
    }
}
