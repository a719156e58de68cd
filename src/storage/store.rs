//! Summary Store - SQLite-backed gateway for summaries, run log and credentials
//!
//! One table per metric family, each unique on
//! `(source, period_start, dimension, metric_name)`. Every write for a source
//! batch happens inside a single transaction; a failure rolls back that batch
//! and leaves everything else as it was.

use crate::credentials::Credential;
use crate::period::Period;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::{MetricFamily, RunRecord, RunStatus, SummaryFilter, WeeklySummaryRecord};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// SQLite summary store
///
/// # Thread Safety
/// The connection sits behind a `Mutex`; callers never hold the guard across
/// an `.await`.
pub struct SummaryStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SummaryStore {
    /// Create or open a store at `path`
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            ",
        )?;

        let store = Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        };
        store.init_schema()?;

        tracing::info!(path = %path.display(), "Summary store opened");
        Ok(store)
    }

    /// Open a throwaway in-memory store
    pub fn open_in_memory() -> StorageResult<Self> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
            path: None,
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StorageError::Lock(e.to_string()))
    }

    fn init_schema(&self) -> StorageResult<()> {
        let conn = self.conn()?;

        for family in MetricFamily::all() {
            let table = family.table();
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    source TEXT NOT NULL,
                    period_start TEXT NOT NULL,
                    period_end TEXT NOT NULL,
                    dimension TEXT NOT NULL,
                    metric_name TEXT NOT NULL,
                    metric_value REAL NOT NULL,
                    updated_at TEXT NOT NULL,
                    UNIQUE(source, period_start, dimension, metric_name)
                );
                CREATE INDEX IF NOT EXISTS idx_{table}_period ON {table}(period_start);"
            ))?;
        }

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS pipeline_runs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source TEXT NOT NULL,
                period_start TEXT NOT NULL,
                period_end TEXT NOT NULL,
                status TEXT NOT NULL,
                records_written INTEGER NOT NULL,
                records_skipped INTEGER NOT NULL,
                error_kind TEXT,
                error TEXT,
                started_at TEXT NOT NULL,
                finished_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_pipeline_runs_source ON pipeline_runs(source);

            CREATE TABLE IF NOT EXISTS credentials (
                id INTEGER PRIMARY KEY,
                integration TEXT NOT NULL UNIQUE,
                secret TEXT NOT NULL,
                refresh_token TEXT,
                expires_at TEXT,
                seeded_secret TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );",
        )?;

        // Databases created before seeded_secret existed
        let has_seeded: bool = conn
            .prepare("SELECT 1 FROM pragma_table_info('credentials') WHERE name = 'seeded_secret'")?
            .exists([])?;
        if !has_seeded {
            conn.execute_batch("ALTER TABLE credentials ADD COLUMN seeded_secret TEXT;")?;
        }

        Ok(())
    }

    // ========== Summaries ==========

    /// Write one source's batch for one period.
    ///
    /// Last write wins per unique key. Keys not present in `records` are left
    /// alone. Returns the number of rows written.
    pub fn upsert(
        &self,
        family: MetricFamily,
        source: &str,
        period: &Period,
        records: &[WeeklySummaryRecord],
    ) -> StorageResult<usize> {
        let write_err = |message: String| StorageError::Write {
            source_name: source.to_string(),
            period: period.to_string(),
            message,
        };

        if let Some(stray) = records
            .iter()
            .find(|r| r.source != source || r.period_start != period.start)
        {
            return Err(write_err(format!(
                "record {}/{} belongs to {} {}",
                stray.dimension, stray.metric_name, stray.source, stray.period_start
            )));
        }

        if records.is_empty() {
            return Ok(0);
        }

        let now = Utc::now().to_rfc3339();
        let sql = format!(
            "INSERT INTO {} (source, period_start, period_end, dimension, metric_name, metric_value, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(source, period_start, dimension, metric_name) DO UPDATE SET
                period_end = excluded.period_end,
                metric_value = excluded.metric_value,
                updated_at = excluded.updated_at",
            family.table()
        );

        let mut conn = self.conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| write_err(e.to_string()))?;

        {
            let mut stmt = tx
                .prepare_cached(&sql)
                .map_err(|e| write_err(e.to_string()))?;

            for record in records {
                stmt.execute(params![
                    record.source,
                    fmt_date(record.period_start),
                    fmt_date(record.period_end),
                    record.dimension,
                    record.metric_name,
                    record.metric_value,
                    now,
                ])
                .map_err(|e| write_err(e.to_string()))?;
            }
        }

        tx.commit().map_err(|e| write_err(e.to_string()))?;

        tracing::debug!(
            source = %source,
            period = %period,
            table = family.table(),
            rows = records.len(),
            "Upserted summaries"
        );
        Ok(records.len())
    }

    /// Summaries across every family matching `filter`, ordered by period,
    /// source, dimension and metric name
    pub fn query(&self, filter: &SummaryFilter) -> StorageResult<Vec<WeeklySummaryRecord>> {
        let mut out = Vec::new();
        for family in MetricFamily::all() {
            out.extend(self.query_family(*family, filter)?);
        }
        out.sort_by(|a, b| {
            (a.period_start, &a.source, &a.dimension, &a.metric_name).cmp(&(
                b.period_start,
                &b.source,
                &b.dimension,
                &b.metric_name,
            ))
        });
        Ok(out)
    }

    /// Summaries from one family's table
    pub fn query_family(
        &self,
        family: MetricFamily,
        filter: &SummaryFilter,
    ) -> StorageResult<Vec<WeeklySummaryRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT source, period_start, period_end, dimension, metric_name, metric_value
             FROM {}
             WHERE (?1 IS NULL OR source = ?1)
               AND (?2 IS NULL OR dimension = ?2)
               AND (?3 IS NULL OR period_start >= ?3)
               AND (?4 IS NULL OR period_start <= ?4)
             ORDER BY period_start, source, dimension, metric_name",
            family.table()
        ))?;

        let rows = stmt.query_map(
            params![
                filter.source,
                filter.dimension,
                filter.from.map(fmt_date),
                filter.to.map(fmt_date),
            ],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, f64>(5)?,
                ))
            },
        )?;

        let mut out = Vec::new();
        for row in rows {
            let (source, start, end, dimension, metric_name, metric_value) = row?;
            out.push(WeeklySummaryRecord {
                source,
                period_start: parse_date(&start)?,
                period_end: parse_date(&end)?,
                dimension,
                metric_name,
                metric_value,
            });
        }
        Ok(out)
    }

    /// Every stored summary for one week
    pub fn period_summaries(&self, period: &Period) -> StorageResult<Vec<WeeklySummaryRecord>> {
        self.query(&SummaryFilter::period(period))
    }

    /// Most recent period a source has summaries for
    pub fn latest_period(&self, source: &str) -> StorageResult<Option<Period>> {
        let conn = self.conn()?;
        let mut latest: Option<(NaiveDate, NaiveDate)> = None;

        for family in MetricFamily::all() {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT period_start, period_end FROM {}
                 WHERE source = ?1
                 ORDER BY period_start DESC
                 LIMIT 1",
                family.table()
            ))?;
            let mut rows = stmt.query(params![source])?;
            if let Some(row) = rows.next()? {
                let start = parse_date(&row.get::<_, String>(0)?)?;
                let end = parse_date(&row.get::<_, String>(1)?)?;
                if latest.map_or(true, |(s, _)| start > s) {
                    latest = Some((start, end));
                }
            }
        }

        Ok(latest.map(|(start, end)| Period { start, end }))
    }

    // ========== Run log ==========

    /// Append a run record, returning its id
    pub fn record_run(&self, run: &RunRecord) -> StorageResult<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO pipeline_runs (
                source, period_start, period_end, status,
                records_written, records_skipped, error_kind, error,
                started_at, finished_at
             )
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                run.source,
                fmt_date(run.period_start),
                fmt_date(run.period_end),
                run.status.as_str(),
                run.records_written as i64,
                run.records_skipped as i64,
                run.error_kind,
                run.error,
                run.started_at.to_rfc3339(),
                run.finished_at.to_rfc3339(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Most recent runs first, optionally for one source
    pub fn recent_runs(&self, source: Option<&str>, limit: usize) -> StorageResult<Vec<RunRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT source, period_start, period_end, status,
                    records_written, records_skipped, error_kind, error,
                    started_at, finished_at
             FROM pipeline_runs
             WHERE (?1 IS NULL OR source = ?1)
             ORDER BY id DESC
             LIMIT ?2",
        )?;

        let mut rows = stmt.query(params![source, limit as i64])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(run_from_row(row)?);
        }
        Ok(out)
    }

    pub fn last_run(&self, source: &str) -> StorageResult<Option<RunRecord>> {
        Ok(self.recent_runs(Some(source), 1)?.into_iter().next())
    }

    // ========== Credentials ==========

    /// Insert or replace the credential for an integration
    pub fn save_credential(&self, credential: &Credential) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn()?.execute(
            "INSERT INTO credentials (integration, secret, refresh_token, expires_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             ON CONFLICT(integration) DO UPDATE SET
                secret = excluded.secret,
                refresh_token = excluded.refresh_token,
                expires_at = excluded.expires_at,
                updated_at = excluded.updated_at",
            params![
                credential.integration,
                credential.secret,
                credential.refresh_token,
                credential.expires_at.map(|t| t.to_rfc3339()),
                now,
            ],
        )?;
        Ok(())
    }

    /// Store a credential taken from configuration, remembering its secret
    /// so a later change in configuration can be told apart from a refresh
    pub fn seed_credential(&self, credential: &Credential) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn()?.execute(
            "INSERT INTO credentials (integration, secret, refresh_token, expires_at, seeded_secret, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?2, ?5, ?5)
             ON CONFLICT(integration) DO UPDATE SET
                secret = excluded.secret,
                refresh_token = excluded.refresh_token,
                expires_at = excluded.expires_at,
                seeded_secret = excluded.seeded_secret,
                updated_at = excluded.updated_at",
            params![
                credential.integration,
                credential.secret,
                credential.refresh_token,
                credential.expires_at.map(|t| t.to_rfc3339()),
                now,
            ],
        )?;
        Ok(())
    }

    /// Secret last written by [`SummaryStore::seed_credential`]
    pub fn seeded_secret(&self, integration: &str) -> StorageResult<Option<String>> {
        let seeded = self
            .conn()?
            .query_row(
                "SELECT seeded_secret FROM credentials WHERE integration = ?1",
                params![integration],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()?;
        Ok(seeded.flatten())
    }

    pub fn load_credential(&self, integration: &str) -> StorageResult<Option<Credential>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT integration, secret, refresh_token, expires_at
             FROM credentials WHERE integration = ?1",
        )?;
        let mut rows = stmt.query(params![integration])?;

        match rows.next()? {
            Some(row) => {
                let expires_at: Option<String> = row.get(3)?;
                Ok(Some(Credential {
                    integration: row.get(0)?,
                    secret: row.get(1)?,
                    refresh_token: row.get(2)?,
                    expires_at: expires_at.as_deref().map(parse_timestamp).transpose()?,
                }))
            }
            None => Ok(None),
        }
    }

    /// Integrations with a stored credential
    pub fn list_credentials(&self) -> StorageResult<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare_cached("SELECT integration FROM credentials ORDER BY integration")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(names)
    }
}

fn run_from_row(row: &Row<'_>) -> StorageResult<RunRecord> {
    let status: String = row.get(3)?;
    Ok(RunRecord {
        source: row.get(0)?,
        period_start: parse_date(&row.get::<_, String>(1)?)?,
        period_end: parse_date(&row.get::<_, String>(2)?)?,
        status: RunStatus::parse(&status)
            .ok_or_else(|| StorageError::Corruption(format!("unknown run status '{status}'")))?,
        records_written: row.get::<_, i64>(4)? as usize,
        records_skipped: row.get::<_, i64>(5)? as usize,
        error_kind: row.get(6)?,
        error: row.get(7)?,
        started_at: parse_timestamp(&row.get::<_, String>(8)?)?,
        finished_at: parse_timestamp(&row.get::<_, String>(9)?)?,
    })
}

fn fmt_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn parse_date(raw: &str) -> StorageResult<NaiveDate> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .map_err(|e| StorageError::Corruption(format!("bad date '{raw}': {e}")))
}

fn parse_timestamp(raw: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StorageError::Corruption(format!("bad timestamp '{raw}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    fn week(start: &str) -> Period {
        Period::from_week_start(NaiveDate::parse_from_str(start, DATE_FORMAT).unwrap())
    }

    fn kids(period: &Period, value: f64) -> WeeklySummaryRecord {
        WeeklySummaryRecord::new("checkins", period, "Kids", "total_attendance", value)
    }

    fn run(source: &str, period: &Period, status: RunStatus) -> RunRecord {
        let now = Utc::now();
        RunRecord {
            source: source.to_string(),
            period_start: period.start,
            period_end: period.end,
            status,
            records_written: 3,
            records_skipped: 1,
            error_kind: None,
            error: None,
            started_at: now,
            finished_at: now,
        }
    }

    #[test]
    fn test_upsert_and_query() {
        let store = SummaryStore::open_in_memory().unwrap();
        let period = week("2024-01-01");

        let written = store
            .upsert(MetricFamily::Attendance, "checkins", &period, &[kids(&period, 15.0)])
            .unwrap();
        assert_eq!(written, 1);

        let rows = store.period_summaries(&period).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].dimension, "Kids");
        assert_eq!(rows[0].metric_value, 15.0);
        assert_eq!(rows[0].period_end, period.end);
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let store = SummaryStore::open_in_memory().unwrap();
        let period = week("2024-01-01");
        let batch = vec![
            kids(&period, 15.0),
            WeeklySummaryRecord::new("checkins", &period, "Students", "total_attendance", 40.0),
        ];

        store.upsert(MetricFamily::Attendance, "checkins", &period, &batch).unwrap();
        let first = store.period_summaries(&period).unwrap();
        store.upsert(MetricFamily::Attendance, "checkins", &period, &batch).unwrap();
        let second = store.period_summaries(&period).unwrap();

        assert_eq!(first, second);
        assert_eq!(second.len(), 2);
    }

    #[test]
    fn test_rerun_overwrites_value() {
        let store = SummaryStore::open_in_memory().unwrap();
        let period = week("2024-01-01");

        store.upsert(MetricFamily::Attendance, "checkins", &period, &[kids(&period, 15.0)]).unwrap();
        store.upsert(MetricFamily::Attendance, "checkins", &period, &[kids(&period, 20.0)]).unwrap();

        let rows = store
            .query(&SummaryFilter::period(&period).source("checkins").dimension("Kids"))
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].metric_value, 20.0);
    }

    #[test]
    fn test_failed_batch_rolls_back() {
        let store = SummaryStore::open_in_memory().unwrap();
        let period = week("2024-01-01");
        store.upsert(MetricFamily::Attendance, "checkins", &period, &[kids(&period, 15.0)]).unwrap();

        // NaN binds as NULL and violates NOT NULL on metric_value
        let batch = vec![
            kids(&period, 99.0),
            WeeklySummaryRecord::new("checkins", &period, "Students", "total_attendance", f64::NAN),
        ];
        let err = store
            .upsert(MetricFamily::Attendance, "checkins", &period, &batch)
            .unwrap_err();
        assert!(matches!(err, StorageError::Write { .. }));

        let rows = store.period_summaries(&period).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].metric_value, 15.0);
    }

    #[test]
    fn test_upsert_rejects_foreign_records() {
        let store = SummaryStore::open_in_memory().unwrap();
        let period = week("2024-01-01");
        let other = week("2024-01-08");

        let err = store
            .upsert(MetricFamily::Attendance, "checkins", &period, &[kids(&other, 1.0)])
            .unwrap_err();
        assert!(matches!(err, StorageError::Write { .. }));
        assert!(store.period_summaries(&other).unwrap().is_empty());
    }

    #[test]
    fn test_query_range_across_families() {
        let store = SummaryStore::open_in_memory().unwrap();
        let w1 = week("2024-01-01");
        let w2 = week("2024-01-08");
        let w3 = week("2024-01-15");

        for p in [&w1, &w2, &w3] {
            store.upsert(MetricFamily::Attendance, "checkins", p, &[kids(p, 10.0)]).unwrap();
            store
                .upsert(
                    MetricFamily::Email,
                    "mailchimp",
                    p,
                    &[WeeklySummaryRecord::new("mailchimp", p, "Weekly", "email_count", 2.0)],
                )
                .unwrap();
        }

        let filter = SummaryFilter {
            from: Some(w2.start),
            to: Some(w3.start),
            ..Default::default()
        };
        let rows = store.query(&filter).unwrap();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].period_start, w2.start);
        assert_eq!(rows[0].source, "checkins");
        assert_eq!(rows[1].source, "mailchimp");

        let email_only = store.query(&filter.clone().source("mailchimp")).unwrap();
        assert_eq!(email_only.len(), 2);
    }

    #[test]
    fn test_latest_period() {
        let store = SummaryStore::open_in_memory().unwrap();
        assert_eq!(store.latest_period("checkins").unwrap(), None);

        let w1 = week("2024-01-01");
        let w2 = week("2024-01-08");
        store.upsert(MetricFamily::Attendance, "checkins", &w2, &[kids(&w2, 1.0)]).unwrap();
        store.upsert(MetricFamily::Attendance, "checkins", &w1, &[kids(&w1, 1.0)]).unwrap();

        assert_eq!(store.latest_period("checkins").unwrap(), Some(w2));
    }

    #[test]
    fn test_run_log() {
        let store = SummaryStore::open_in_memory().unwrap();
        let period = week("2024-01-01");

        store.record_run(&run("checkins", &period, RunStatus::Succeeded)).unwrap();
        let mut failed = run("mailchimp", &period, RunStatus::Failed);
        failed.error_kind = Some("auth".to_string());
        failed.error = Some("401".to_string());
        store.record_run(&failed).unwrap();

        let all = store.recent_runs(None, 10).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].source, "mailchimp");

        let last = store.last_run("mailchimp").unwrap().unwrap();
        assert_eq!(last.status, RunStatus::Failed);
        assert_eq!(last.error_kind.as_deref(), Some("auth"));
        assert!(store.last_run("youtube").unwrap().is_none());
    }

    #[test]
    fn test_credentials_upsert() {
        let store = SummaryStore::open_in_memory().unwrap();
        assert!(store.load_credential("youtube").unwrap().is_none());

        let mut cred = Credential {
            integration: "youtube".to_string(),
            secret: "token-1".to_string(),
            refresh_token: Some("refresh".to_string()),
            expires_at: Some(Utc::now() + Duration::hours(1)),
        };
        store.save_credential(&cred).unwrap();

        cred.secret = "token-2".to_string();
        store.save_credential(&cred).unwrap();

        let loaded = store.load_credential("youtube").unwrap().unwrap();
        assert_eq!(loaded.secret, "token-2");
        assert_eq!(loaded.refresh_token.as_deref(), Some("refresh"));
        assert!(loaded.expires_at.is_some());
        assert_eq!(store.list_credentials().unwrap(), vec!["youtube".to_string()]);
    }

    #[test]
    fn test_seeded_secret_survives_refresh() {
        let store = SummaryStore::open_in_memory().unwrap();
        assert_eq!(store.seeded_secret("youtube").unwrap(), None);

        store.seed_credential(&Credential::api_key("youtube", "configured")).unwrap();
        store.save_credential(&Credential::api_key("youtube", "refreshed")).unwrap();

        assert_eq!(store.load_credential("youtube").unwrap().unwrap().secret, "refreshed");
        assert_eq!(store.seeded_secret("youtube").unwrap().as_deref(), Some("configured"));
    }

    #[test]
    fn test_adds_seeded_secret_column_to_old_database() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tally.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE credentials (
                    id INTEGER PRIMARY KEY,
                    integration TEXT NOT NULL UNIQUE,
                    secret TEXT NOT NULL,
                    refresh_token TEXT,
                    expires_at TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );
                INSERT INTO credentials (integration, secret, created_at, updated_at)
                VALUES ('mailchimp', 'old-key', '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z');",
            )
            .unwrap();
        }

        let store = SummaryStore::open(&path).unwrap();
        assert_eq!(store.seeded_secret("mailchimp").unwrap(), None);
        assert_eq!(store.load_credential("mailchimp").unwrap().unwrap().secret, "old-key");
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data").join("tally.db");
        let period = week("2024-01-01");

        {
            let store = SummaryStore::open(&path).unwrap();
            store.upsert(MetricFamily::Attendance, "checkins", &period, &[kids(&period, 15.0)]).unwrap();
        }

        let store = SummaryStore::open(&path).unwrap();
        assert_eq!(store.period_summaries(&period).unwrap().len(), 1);
        assert_eq!(store.path(), Some(path.as_path()));
    }
}
