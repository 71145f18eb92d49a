//! SQL schema for the Reach SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
///
/// Timestamps are fixed-width RFC 3339 strings in UTC, so lexical order is
/// chronological order. Money is stored as decimal text, with `spend_key`
/// holding a zero-padded copy whose lexical order is numeric order.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS customers (
    customer_id       TEXT PRIMARY KEY,
    external_ref      TEXT,
    name              TEXT NOT NULL,
    email             TEXT NOT NULL UNIQUE,
    phone             TEXT,
    total_spend       TEXT NOT NULL DEFAULT '0',
    spend_key         TEXT NOT NULL,    -- fixed-width copy of total_spend for comparisons
    visit_count       INTEGER NOT NULL DEFAULT 0,
    last_visit        TEXT,             -- NULL until the first order
    registration_date TEXT NOT NULL,
    created_at        TEXT NOT NULL,
    updated_at        TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS orders (
    order_id     TEXT PRIMARY KEY,
    customer_id  TEXT NOT NULL REFERENCES customers(customer_id),
    external_ref TEXT,
    amount       TEXT NOT NULL,
    order_date   TEXT NOT NULL,
    items        TEXT NOT NULL DEFAULT '[]',   -- JSON array of strings
    created_at   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS segments (
    segment_id    TEXT PRIMARY KEY,
    name          TEXT NOT NULL,
    description   TEXT,
    rules         TEXT NOT NULL DEFAULT '[]',  -- JSON array of rules
    audience_size INTEGER NOT NULL DEFAULT 0,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS campaigns (
    campaign_id     TEXT PRIMARY KEY,
    name            TEXT NOT NULL,
    segment_id      TEXT NOT NULL REFERENCES segments(segment_id),
    message         TEXT NOT NULL,
    channel         TEXT NOT NULL,    -- 'email' | 'sms' | 'push'
    status          TEXT NOT NULL,    -- 'draft' | 'active' | 'completed' | 'failed'
    audience_size   INTEGER NOT NULL DEFAULT 0,
    sent_count      INTEGER NOT NULL DEFAULT 0,
    delivered_count INTEGER NOT NULL DEFAULT 0,
    failed_count    INTEGER NOT NULL DEFAULT 0,
    delivery_rate   REAL NOT NULL DEFAULT 0,
    launched_at     TEXT,
    completed_at    TEXT,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);

-- One row per (campaign, customer) delivery attempt. Only the status
-- columns change after insert, and only away from 'SENT'.
CREATE TABLE IF NOT EXISTS communication_log (
    message_id   TEXT PRIMARY KEY,
    campaign_id  TEXT NOT NULL REFERENCES campaigns(campaign_id),
    customer_id  TEXT NOT NULL REFERENCES customers(customer_id),
    status       TEXT NOT NULL,      -- 'SENT' | 'DELIVERED' | 'FAILED'
    channel      TEXT NOT NULL,
    message      TEXT NOT NULL,
    error_reason TEXT,
    sent_at      TEXT NOT NULL,
    delivered_at TEXT,
    created_at   TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS orders_customer_idx  ON orders(customer_id);
CREATE INDEX IF NOT EXISTS campaigns_segment_idx ON campaigns(segment_id);
CREATE INDEX IF NOT EXISTS log_campaign_idx     ON communication_log(campaign_id);

PRAGMA user_version = 1;
";
