/// DuckDB initialization SQL.
///
/// Executed once at database open time via `Connection::execute_batch`. All
/// statements use `IF NOT EXISTS` so they are safe to re-run on every
/// startup.
///
/// `memory_limit` is a DuckDB size string (e.g. `"512MB"`, `"1GB"`), read
/// from `Config.duckdb_memory_limit` at the call site. An explicit limit is
/// always set: the DuckDB default (80% of system RAM) is not acceptable for
/// a long-running process. `threads = 2` bounds the background thread pool
/// for single-writer embedded use.
pub fn init_sql(memory_limit: &str) -> String {
    format!(
        r#"SET memory_limit = '{memory_limit}';
SET threads = 2;

-- ===========================================
-- SITES (externally managed; existence + identifier lookup only)
-- ===========================================
CREATE TABLE IF NOT EXISTS sites (
    id              VARCHAR PRIMARY KEY,           -- UUID v4
    name            VARCHAR NOT NULL,
    identifier      VARCHAR(50) NOT NULL UNIQUE,   -- e.g. 'pine-owl-AB12CD'
    created_at      TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at      TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
CREATE INDEX IF NOT EXISTS idx_sites_identifier ON sites(identifier);

-- ===========================================
-- PAGE VIEWS (append-only event table)
-- ===========================================
-- Rows are never deleted and created_at is never mutated. The only writes
-- after insert are session_id + is_processed, set by the session resolver.
CREATE TABLE IF NOT EXISTS page_views (
    id              VARCHAR PRIMARY KEY,           -- UUID v4
    site_id         VARCHAR NOT NULL,
    session_id      VARCHAR,                       -- NULL until the resolver runs

    url             VARCHAR NOT NULL,
    path            VARCHAR NOT NULL,
    referrer        VARCHAR,
    referrer_domain VARCHAR,

    -- Visitor origin, pre-hashed / pre-parsed upstream
    ip_hash         VARCHAR(64) NOT NULL,
    user_agent      VARCHAR NOT NULL,
    browser         VARCHAR,
    browser_version VARCHAR,
    operating_system VARCHAR,
    device_type     VARCHAR,                       -- 'desktop' | 'mobile' | 'tablet' | 'bot' | 'unknown'
    country         VARCHAR(2),                    -- ISO 3166-1 alpha-2
    region          VARCHAR,
    city            VARCHAR,

    is_processed    BOOLEAN NOT NULL DEFAULT false,
    created_at      TIMESTAMP NOT NULL
);

-- Bucket range scans: site + time window
CREATE INDEX IF NOT EXISTS idx_page_views_site_time
    ON page_views(site_id, created_at);
-- Session-resolver catch-up sweep
CREATE INDEX IF NOT EXISTS idx_page_views_unprocessed
    ON page_views(is_processed, created_at);
-- Session metric recomputation
CREATE INDEX IF NOT EXISTS idx_page_views_session
    ON page_views(session_id, created_at);

-- ===========================================
-- SESSIONS (derived, updated as pageviews are assigned)
-- ===========================================
-- session_key is the deterministic sha256(ip_hash:ua:window) digest. The
-- UNIQUE constraint is the tie-breaker when two resolvers race to create the
-- same fresh session: the loser re-fetches and updates instead of inserting.
CREATE TABLE IF NOT EXISTS sessions (
    id              VARCHAR PRIMARY KEY,           -- UUID v4
    site_id         VARCHAR NOT NULL,
    session_key     VARCHAR(64) NOT NULL UNIQUE,
    is_bounce       BOOLEAN NOT NULL DEFAULT true,
    duration        BIGINT NOT NULL DEFAULT 0,     -- whole seconds, first to last pageview
    page_view_count BIGINT NOT NULL DEFAULT 0,
    referrer        VARCHAR,
    referrer_domain VARCHAR,
    enter_page      VARCHAR NOT NULL,
    exit_page       VARCHAR,
    created_at      TIMESTAMP NOT NULL,
    updated_at      TIMESTAMP NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_sessions_site ON sessions(site_id, created_at);

-- ===========================================
-- BUCKET AGGREGATES
-- ===========================================
-- One row per (site, bucket_start). pageview_count is monotonically
-- non-decreasing and advanced by the watermark; unique_session_count is
-- recomputed from the full bucket range on every update. A row exists for
-- every bucket an aggregation run has visited, including zero-event buckets
-- (the gap scanner relies on row existence to mean "already aggregated").
CREATE TABLE IF NOT EXISTS hourly_bucket_stats (
    id                          VARCHAR PRIMARY KEY,
    site_id                     VARCHAR NOT NULL,
    bucket_start                TIMESTAMP NOT NULL, -- hour-truncated UTC
    pageview_count              BIGINT NOT NULL DEFAULT 0,
    unique_session_count        BIGINT NOT NULL DEFAULT 0,
    last_processed_pageview_id  VARCHAR,            -- watermark; NULL until first pageview folded in
    created_at                  TIMESTAMP NOT NULL,
    updated_at                  TIMESTAMP NOT NULL,
    UNIQUE (site_id, bucket_start)
);
CREATE INDEX IF NOT EXISTS idx_hourly_stats_site_bucket
    ON hourly_bucket_stats(site_id, bucket_start);

CREATE TABLE IF NOT EXISTS daily_bucket_stats (
    id                          VARCHAR PRIMARY KEY,
    site_id                     VARCHAR NOT NULL,
    bucket_start                DATE NOT NULL,      -- calendar day, UTC
    pageview_count              BIGINT NOT NULL DEFAULT 0,
    unique_session_count        BIGINT NOT NULL DEFAULT 0,
    last_processed_pageview_id  VARCHAR,
    created_at                  TIMESTAMP NOT NULL,
    updated_at                  TIMESTAMP NOT NULL,
    UNIQUE (site_id, bucket_start)
);
CREATE INDEX IF NOT EXISTS idx_daily_stats_site_bucket
    ON daily_bucket_stats(site_id, bucket_start);
"#
    )
}
