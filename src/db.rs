//! Database module - PostgreSQL connection and migrations

use sqlx::{postgres::PgPoolOptions, PgPool};

/// Create database connection pool
pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
}

/// Run database migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    // raw_sql: the schema is several statements
    sqlx::raw_sql(SCHEMA_SQL)
        .execute(pool)
        .await?;

    tracing::info!("Database schema applied successfully");
    Ok(())
}

/// Database schema SQL
const SCHEMA_SQL: &str = r#"
-- Location configuration (exactly one active row)
CREATE TABLE IF NOT EXISTS location_configs (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    name VARCHAR(255) NOT NULL,
    reference_latitude DOUBLE PRECISION NOT NULL,
    reference_longitude DOUBLE PRECISION NOT NULL,
    radius_meters DOUBLE PRECISION NOT NULL,
    allowed_ssids TEXT[] NOT NULL DEFAULT '{}',
    allowed_ip_ranges TEXT[] NOT NULL DEFAULT '{}',
    is_active BOOLEAN NOT NULL DEFAULT false,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

-- Enrolled biometrics (one per user, replaced on re-enrollment)
CREATE TABLE IF NOT EXISTS enrolled_biometrics (
    user_id UUID PRIMARY KEY,
    reference_fingerprint_hash VARCHAR(512) NOT NULL,
    reference_photo_url TEXT NOT NULL,
    credential_id VARCHAR(512),
    enrolled_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

-- Attendance records (one per user per day)
CREATE TABLE IF NOT EXISTS attendance_records (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    user_id UUID NOT NULL,
    date DATE NOT NULL,
    check_in_time TIMESTAMPTZ,
    check_out_time TIMESTAMPTZ,
    check_in_distance_meters DOUBLE PRECISION,
    network_signature VARCHAR(255),
    security_score INT NOT NULL DEFAULT 100,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    CONSTRAINT uq_attendance_user_date UNIQUE (user_id, date)
);

-- Security events (append-only)
CREATE TABLE IF NOT EXISTS security_events (
    id BIGSERIAL PRIMARY KEY,
    user_id UUID NOT NULL,
    event_type VARCHAR(64) NOT NULL,
    severity VARCHAR(16) NOT NULL,
    details JSONB,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

-- Face verification learning log (append-only)
CREATE TABLE IF NOT EXISTS face_verification_logs (
    id BIGSERIAL PRIMARY KEY,
    user_id UUID NOT NULL,
    provider_name VARCHAR(64) NOT NULL,
    success BOOLEAN NOT NULL,
    face_detected BOOLEAN NOT NULL,
    match_score DOUBLE PRECISION NOT NULL,
    confidence DOUBLE PRECISION NOT NULL,
    is_live BOOLEAN NOT NULL,
    is_fake BOOLEAN NOT NULL,
    accepted BOOLEAN NOT NULL,
    reasoning TEXT,
    photo_sha256 CHAR(64) NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

-- Indexes
CREATE UNIQUE INDEX IF NOT EXISTS uq_location_single_active ON location_configs(is_active) WHERE is_active;
CREATE INDEX IF NOT EXISTS idx_attendance_user_date ON attendance_records(user_id, date DESC);
CREATE INDEX IF NOT EXISTS idx_security_events_user ON security_events(user_id, created_at);
CREATE INDEX IF NOT EXISTS idx_face_logs_user ON face_verification_logs(user_id, created_at);
"#;
