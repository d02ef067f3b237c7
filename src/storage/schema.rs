use anyhow::Result;
use rusqlite::Connection;

pub const TIERS_TABLE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS tiers (
    user_id TEXT PRIMARY KEY,
    tier TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;

pub const QUOTA_WINDOWS_TABLE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS quota_windows (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    limit_type TEXT NOT NULL,
    window_start INTEGER NOT NULL,
    window_end INTEGER NOT NULL,
    current_count INTEGER NOT NULL,
    limit_value INTEGER NOT NULL,
    UNIQUE(user_id, limit_type, window_start)
);
"#;

pub const MONTHLY_USAGE_TABLE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS monthly_usage (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    month TEXT NOT NULL,
    message_count INTEGER NOT NULL,
    input_tokens INTEGER NOT NULL,
    output_tokens INTEGER NOT NULL,
    cached_tokens INTEGER NOT NULL,
    total_cost TEXT NOT NULL,
    cached_savings TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(user_id, month)
);
"#;

pub const USAGE_EVENTS_TABLE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS usage_events (
    event_id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    model_id TEXT NOT NULL,
    provider TEXT,
    session_id TEXT,
    input_tokens INTEGER NOT NULL,
    output_tokens INTEGER NOT NULL,
    cached_tokens INTEGER NOT NULL,
    cost TEXT NOT NULL,
    cached_savings TEXT NOT NULL,
    latency_ms INTEGER NOT NULL,
    cache_hit INTEGER NOT NULL,
    tools_used TEXT NOT NULL,
    success INTEGER NOT NULL,
    error_type TEXT,
    timestamp TEXT NOT NULL
);
"#;

pub const METER_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_windows_user_type ON quota_windows(user_id, limit_type, window_end);
CREATE INDEX IF NOT EXISTS idx_windows_end ON quota_windows(window_end);
CREATE INDEX IF NOT EXISTS idx_usage_user_month ON monthly_usage(user_id, month);
CREATE INDEX IF NOT EXISTS idx_events_user_timestamp ON usage_events(user_id, timestamp);
"#;

pub fn init_database(conn: &Connection) -> Result<()> {
    conn.execute_batch(TIERS_TABLE_SCHEMA)?;
    conn.execute_batch(QUOTA_WINDOWS_TABLE_SCHEMA)?;
    conn.execute_batch(MONTHLY_USAGE_TABLE_SCHEMA)?;
    conn.execute_batch(USAGE_EVENTS_TABLE_SCHEMA)?;
    conn.execute_batch(METER_INDEXES)?;
    Ok(())
}
