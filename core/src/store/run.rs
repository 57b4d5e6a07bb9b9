use super::{time_from_sql, time_to_sql, AllocStore};
use crate::{
    error::{AllocError, AllocResult},
    ledger::{AllocationRun, ModelRef, RunStatus},
};
use rusqlite::{params, Connection, OptionalExtension};

struct RunRow {
    run_id: String,
    model_name: String,
    model_version: i64,
    period: String,
    scenario: String,
    started_at: String,
    finished_at: Option<String>,
    status: String,
    message: Option<String>,
}

impl RunRow {
    fn into_run(self) -> AllocResult<AllocationRun> {
        Ok(AllocationRun {
            run_id: self.run_id,
            model: ModelRef {
                name: self.model_name,
                version: self.model_version as u32,
            },
            period: self.period,
            scenario: self.scenario,
            started_at: time_from_sql(&self.started_at)?,
            finished_at: self.finished_at.as_deref().map(time_from_sql).transpose()?,
            status: self.status.parse()?,
            message: self.message,
        })
    }
}

impl AllocStore {
    // ── Run ───────────────────────────────────────────────────────

    pub fn insert_run(&self, run: &AllocationRun) -> AllocResult<()> {
        self.conn.execute(
            "INSERT INTO allocation_run (
                run_id, model_name, model_version, period, scenario,
                started_at, finished_at, status, message
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                run.run_id,
                run.model.name,
                run.model.version as i64,
                run.period,
                run.scenario,
                time_to_sql(&run.started_at),
                run.finished_at.as_ref().map(time_to_sql),
                run.status.as_str(),
                run.message,
            ],
        )?;
        Ok(())
    }

    /// Persist a status transition. Only a running row can change; the
    /// WHERE clause keeps finished runs frozen at the database level too.
    pub fn update_run(&self, run: &AllocationRun) -> AllocResult<()> {
        if set_status(&self.conn, run)? == 0 {
            return Err(self.not_running(&run.run_id)?);
        }
        Ok(())
    }

    /// Why a status update touched no row.
    pub(super) fn not_running(&self, run_id: &str) -> AllocResult<AllocError> {
        Ok(match self.run(run_id)? {
            None => AllocError::RunNotFound {
                run_id: run_id.to_string(),
            },
            Some(existing) => AllocError::RunFinished {
                run_id: run_id.to_string(),
                status: existing.status.to_string(),
            },
        })
    }

    pub fn save_input(&self, run_id: &str, input_json: &str) -> AllocResult<()> {
        self.conn.execute(
            "UPDATE allocation_run SET input_json = ?1 WHERE run_id = ?2",
            params![input_json, run_id],
        )?;
        Ok(())
    }

    pub fn input_json(&self, run_id: &str) -> AllocResult<Option<String>> {
        let json = self
            .conn
            .query_row(
                "SELECT input_json FROM allocation_run WHERE run_id = ?1",
                params![run_id],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()?;
        Ok(json.flatten())
    }

    pub fn run(&self, run_id: &str) -> AllocResult<Option<AllocationRun>> {
        let row = self
            .conn
            .query_row(
                "SELECT run_id, model_name, model_version, period, scenario,
                        started_at, finished_at, status, message
                 FROM allocation_run WHERE run_id = ?1",
                params![run_id],
                |row| {
                    Ok(RunRow {
                        run_id: row.get(0)?,
                        model_name: row.get(1)?,
                        model_version: row.get(2)?,
                        period: row.get(3)?,
                        scenario: row.get(4)?,
                        started_at: row.get(5)?,
                        finished_at: row.get(6)?,
                        status: row.get(7)?,
                        message: row.get(8)?,
                    })
                },
            )
            .optional()?;
        row.map(RunRow::into_run).transpose()
    }

    pub fn runs_with_status(&self, status: RunStatus) -> AllocResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT run_id FROM allocation_run WHERE status = ?1 ORDER BY started_at ASC",
        )?;
        let ids = stmt
            .query_map(params![status.as_str()], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(ids)
    }
}

/// Rows changed; zero when the run is missing or already finished.
pub(super) fn set_status(conn: &Connection, run: &AllocationRun) -> AllocResult<usize> {
    let changed = conn.execute(
        "UPDATE allocation_run SET status = ?1, finished_at = ?2, message = ?3
         WHERE run_id = ?4 AND status = 'running'",
        params![
            run.status.as_str(),
            run.finished_at.as_ref().map(time_to_sql),
            run.message,
            run.run_id,
        ],
    )?;
    Ok(changed)
}
