use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use anyhow::Result;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use rust_decimal::Decimal;

use crate::limiter::LimitType;
use crate::tier::Tier;
use crate::usage::{MonthlyUsage, UsageDelta, UsageEvent};

use super::error::StorageError;
use super::schema::init_database;
use super::METER_DB_FILENAME;

#[derive(Debug, Clone)]
pub struct QuotaWindowRow {
    pub user_id: String,
    pub limit_type: LimitType,
    pub window_start: i64,
    pub window_end: i64,
    pub current_count: u64,
    pub limit_value: u64,
}

pub struct MeterDatabase {
    conn: Mutex<Connection>,
}

impl MeterDatabase {
    pub fn new(data_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&data_dir)?;
        let db_path = data_dir.join(METER_DB_FILENAME);
        let conn = Connection::open(&db_path)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        init_database(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn
            .lock()
            .map_err(|_| StorageError::InvalidValue("connection poisoned".into()))
    }

    // --- tiers ---

    pub fn get_tier(&self, user_id: &str) -> Result<Option<Tier>, StorageError> {
        let conn = self.lock()?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT tier FROM tiers WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;

        match raw {
            Some(value) => {
                let tier = Tier::from_str(&value)
                    .map_err(|err| StorageError::InvalidValue(err.to_string()))?;
                Ok(Some(tier))
            }
            None => Ok(None),
        }
    }

    pub fn set_tier(&self, user_id: &str, tier: Tier) -> Result<(), StorageError> {
        let conn = self.lock()?;
        let now = Utc::now().to_rfc3339();

        conn.execute(
            r#"
            INSERT INTO tiers (user_id, tier, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?3)
            ON CONFLICT(user_id) DO UPDATE SET
                tier = excluded.tier,
                updated_at = excluded.updated_at
            "#,
            params![user_id, tier.as_str(), now],
        )?;

        Ok(())
    }

    // --- quota windows ---

    /// Lazily creates the window for the given aligned slot. Concurrent
    /// creators converge on the same row through the unique key; the limit
    /// captured here stays fixed for the window's lifetime even if the
    /// tier's policy changes mid-window.
    pub fn ensure_window(
        &self,
        user_id: &str,
        limit_type: LimitType,
        window_start: i64,
        window_end: i64,
        limit_value: u64,
    ) -> Result<(), StorageError> {
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT OR IGNORE INTO quota_windows
                (user_id, limit_type, window_start, window_end, current_count, limit_value)
            VALUES (?1, ?2, ?3, ?4, 0, ?5)
            "#,
            params![
                user_id,
                limit_type.as_str(),
                window_start,
                window_end,
                limit_value as i64
            ],
        )?;
        Ok(())
    }

    /// Conditionally consumes one admission slot in the active window.
    /// A single UPDATE carries both the limit check and the increment, so
    /// concurrent callers can never admit past the limit or lose a count.
    pub fn try_increment_window(
        &self,
        user_id: &str,
        limit_type: LimitType,
        now_ts: i64,
    ) -> Result<bool, StorageError> {
        let conn = self.lock()?;
        let changed = conn.execute(
            r#"
            UPDATE quota_windows
            SET current_count = current_count + 1
            WHERE user_id = ?1
              AND limit_type = ?2
              AND window_end > ?3
              AND current_count < limit_value
            "#,
            params![user_id, limit_type.as_str(), now_ts],
        )?;
        Ok(changed == 1)
    }

    pub fn get_active_window(
        &self,
        user_id: &str,
        limit_type: LimitType,
        now_ts: i64,
    ) -> Result<Option<QuotaWindowRow>, StorageError> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                r#"
                SELECT user_id, limit_type, window_start, window_end, current_count, limit_value
                FROM quota_windows
                WHERE user_id = ?1 AND limit_type = ?2 AND window_end > ?3
                "#,
                params![user_id, limit_type.as_str(), now_ts],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, i64>(5)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(user_id, limit_type, window_start, window_end, count, limit)| {
            let limit_type = LimitType::from_str(&limit_type)
                .map_err(|_| StorageError::InvalidValue(format!("limit type '{limit_type}'")))?;
            Ok(QuotaWindowRow {
                user_id,
                limit_type,
                window_start,
                window_end,
                current_count: count as u64,
                limit_value: limit as u64,
            })
        })
        .transpose()
    }

    /// Removes windows that expired before the cutoff. Never called on the
    /// admission path; the reaper task drives this on its own interval.
    pub fn purge_expired_windows(&self, cutoff_ts: i64) -> Result<usize, StorageError> {
        let conn = self.lock()?;
        let removed = conn.execute(
            "DELETE FROM quota_windows WHERE window_end <= ?1",
            params![cutoff_ts],
        )?;
        Ok(removed)
    }

    // --- monthly usage aggregates ---

    /// Applies one event's delta to the (user, month) aggregate. The integer
    /// columns advance through relative updates and the decimal money
    /// columns are read and re-written inside the same immediate
    /// transaction, so concurrent writers serialize on the store rather
    /// than racing through stale snapshots.
    pub fn apply_usage_delta(
        &self,
        user_id: &str,
        month: &str,
        delta: &UsageDelta,
    ) -> Result<(), StorageError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let now = Utc::now().to_rfc3339();

        tx.execute(
            r#"
            INSERT INTO monthly_usage
                (user_id, month, message_count, input_tokens, output_tokens,
                 cached_tokens, total_cost, cached_savings, updated_at)
            VALUES (?1, ?2, 0, 0, 0, 0, '0', '0', ?3)
            ON CONFLICT(user_id, month) DO NOTHING
            "#,
            params![user_id, month, now],
        )?;

        let (total_cost, cached_savings): (String, String) = tx.query_row(
            "SELECT total_cost, cached_savings FROM monthly_usage WHERE user_id = ?1 AND month = ?2",
            params![user_id, month],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let total_cost = parse_decimal("total_cost", &total_cost)? + delta.cost;
        let cached_savings = parse_decimal("cached_savings", &cached_savings)? + delta.cached_savings;

        tx.execute(
            r#"
            UPDATE monthly_usage
            SET message_count = message_count + ?1,
                input_tokens = input_tokens + ?2,
                output_tokens = output_tokens + ?3,
                cached_tokens = cached_tokens + ?4,
                total_cost = ?5,
                cached_savings = ?6,
                updated_at = ?7
            WHERE user_id = ?8 AND month = ?9
            "#,
            params![
                delta.message_count as i64,
                delta.input_tokens as i64,
                delta.output_tokens as i64,
                delta.cached_tokens as i64,
                total_cost.to_string(),
                cached_savings.to_string(),
                now,
                user_id,
                month
            ],
        )?;

        tx.commit()?;
        Ok(())
    }

    pub fn get_monthly_usage(
        &self,
        user_id: &str,
        month: &str,
    ) -> Result<Option<MonthlyUsage>, StorageError> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                r#"
                SELECT message_count, input_tokens, output_tokens, cached_tokens,
                       total_cost, cached_savings
                FROM monthly_usage
                WHERE user_id = ?1 AND month = ?2
                "#,
                params![user_id, month],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(messages, input, output, cached, cost, savings)| {
            Ok(MonthlyUsage {
                user_id: user_id.to_string(),
                month: month.to_string(),
                message_count: messages as u64,
                input_tokens: input as u64,
                output_tokens: output as u64,
                cached_tokens: cached as u64,
                total_cost: parse_decimal("total_cost", &cost)?,
                cached_savings: parse_decimal("cached_savings", &savings)?,
            })
        })
        .transpose()
    }

    // --- usage events ---

    pub fn append_event(&self, event: &UsageEvent) -> Result<(), StorageError> {
        let conn = self.lock()?;
        let tools_used = serde_json::to_string(&event.tools_used)
            .map_err(|err| StorageError::InvalidValue(err.to_string()))?;

        conn.execute(
            r#"
            INSERT INTO usage_events (
                event_id, user_id, model_id, provider, session_id,
                input_tokens, output_tokens, cached_tokens,
                cost, cached_savings, latency_ms, cache_hit,
                tools_used, success, error_type, timestamp
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
            "#,
            params![
                event.event_id,
                event.user_id,
                event.model_id,
                event.provider,
                event.session_id,
                event.input_tokens as i64,
                event.output_tokens as i64,
                event.cached_tokens as i64,
                event.cost.to_string(),
                event.cached_savings.to_string(),
                event.latency_ms as i64,
                if event.cache_hit { 1 } else { 0 },
                tools_used,
                if event.success { 1 } else { 0 },
                event.error_type,
                event.timestamp.to_rfc3339(),
            ],
        )?;

        Ok(())
    }

    pub fn recent_events(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<UsageEvent>, StorageError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT event_id, user_id, model_id, provider, session_id,
                   input_tokens, output_tokens, cached_tokens,
                   cost, cached_savings, latency_ms, cache_hit,
                   tools_used, success, error_type, timestamp
            FROM usage_events
            WHERE user_id = ?1
            ORDER BY timestamp DESC
            LIMIT ?2
            "#,
        )?;

        let rows = stmt.query_map(params![user_id, limit as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, i64>(5)?,
                row.get::<_, i64>(6)?,
                row.get::<_, i64>(7)?,
                row.get::<_, String>(8)?,
                row.get::<_, String>(9)?,
                row.get::<_, i64>(10)?,
                row.get::<_, i64>(11)?,
                row.get::<_, String>(12)?,
                row.get::<_, i64>(13)?,
                row.get::<_, Option<String>>(14)?,
                row.get::<_, String>(15)?,
            ))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (
                event_id,
                user_id,
                model_id,
                provider,
                session_id,
                input_tokens,
                output_tokens,
                cached_tokens,
                cost,
                cached_savings,
                latency_ms,
                cache_hit,
                tools_used,
                success,
                error_type,
                timestamp,
            ) = row?;

            let tools_used: Vec<String> = serde_json::from_str(&tools_used)
                .map_err(|err| StorageError::InvalidValue(err.to_string()))?;
            let timestamp = chrono::DateTime::parse_from_rfc3339(&timestamp)
                .map_err(|err| StorageError::InvalidValue(err.to_string()))?
                .with_timezone(&Utc);

            events.push(UsageEvent {
                event_id,
                user_id,
                model_id,
                provider,
                session_id,
                input_tokens: input_tokens as u64,
                output_tokens: output_tokens as u64,
                cached_tokens: cached_tokens as u64,
                cost: parse_decimal("cost", &cost)?,
                cached_savings: parse_decimal("cached_savings", &cached_savings)?,
                latency_ms: latency_ms as u64,
                cache_hit: cache_hit != 0,
                tools_used,
                success: success != 0,
                error_type,
                timestamp,
            });
        }
        Ok(events)
    }
}

fn parse_decimal(column: &str, raw: &str) -> Result<Decimal, StorageError> {
    Decimal::from_str(raw)
        .map_err(|_| StorageError::InvalidValue(format!("{column} is not a decimal: '{raw}'")))
}
