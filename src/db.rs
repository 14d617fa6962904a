use std::str::FromStr;

use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};

/// Uuids are stored as 16-byte blobs, timestamps as UTC text. Timestamp
/// columns are never compared in SQL; the text encoding is not ordered once
/// subsecond widths differ, so all interval logic happens in Rust.
const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS accounts (
    id BLOB PRIMARY KEY,
    username TEXT NOT NULL UNIQUE,
    display_name TEXT NOT NULL DEFAULT '',
    role TEXT CHECK (role IN ('student', 'tutor'))
);

CREATE TABLE IF NOT EXISTS students (
    id BLOB PRIMARY KEY,
    account_id BLOB NOT NULL UNIQUE REFERENCES accounts(id) ON DELETE CASCADE,
    date_of_birth TEXT,
    gender TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS tutors (
    id BLOB PRIMARY KEY,
    account_id BLOB NOT NULL UNIQUE REFERENCES accounts(id) ON DELETE CASCADE,
    date_of_birth TEXT,
    gender TEXT NOT NULL DEFAULT '',
    hourly_rate_cents INTEGER,
    subjects TEXT NOT NULL DEFAULT '[]',
    level TEXT CHECK (level IN ('high_school', 'bachelor', 'master', 'phd')),
    available INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS student_tutors (
    student_id BLOB NOT NULL REFERENCES students(id) ON DELETE CASCADE,
    tutor_id BLOB NOT NULL REFERENCES tutors(id) ON DELETE CASCADE,
    PRIMARY KEY (student_id, tutor_id)
);

CREATE TABLE IF NOT EXISTS locations (
    id BLOB PRIMARY KEY,
    address TEXT NOT NULL,
    google_id TEXT NOT NULL DEFAULT '',
    latitude REAL NOT NULL,
    longitude REAL NOT NULL,
    student_id BLOB REFERENCES students(id) ON DELETE CASCADE,
    tutor_id BLOB REFERENCES tutors(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS meetings (
    id BLOB PRIMARY KEY,
    student_id BLOB NOT NULL REFERENCES students(id) ON DELETE CASCADE,
    tutor_id BLOB NOT NULL REFERENCES tutors(id) ON DELETE CASCADE,
    starts_at TEXT NOT NULL,
    ends_at TEXT NOT NULL,
    student_accepted_at TEXT,
    student_cancelled_at TEXT,
    tutor_accepted_at TEXT,
    tutor_cancelled_at TEXT,
    location_id BLOB REFERENCES locations(id) ON DELETE SET NULL
);
CREATE INDEX IF NOT EXISTS idx_meetings_student ON meetings(student_id);
CREATE INDEX IF NOT EXISTS idx_meetings_tutor ON meetings(tutor_id);

CREATE TABLE IF NOT EXISTS reviews (
    id BLOB PRIMARY KEY,
    meeting_id BLOB NOT NULL UNIQUE REFERENCES meetings(id) ON DELETE CASCADE,
    rating INTEGER NOT NULL CHECK (rating BETWEEN 0 AND 5),
    comment TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS message_threads (
    id BLOB PRIMARY KEY,
    student_id BLOB REFERENCES students(id) ON DELETE SET NULL,
    tutor_id BLOB REFERENCES tutors(id) ON DELETE SET NULL,
    UNIQUE (student_id, tutor_id)
);

CREATE TABLE IF NOT EXISTS messages (
    id BLOB PRIMARY KEY,
    thread_id BLOB NOT NULL REFERENCES message_threads(id) ON DELETE CASCADE,
    sent_by TEXT NOT NULL CHECK (sent_by IN ('student', 'tutor')),
    content TEXT NOT NULL,
    sent_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_messages_thread ON messages(thread_id);
";

pub async fn connect(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new().connect_with(options).await?;
    init_schema(&pool).await?;
    Ok(pool)
}

pub async fn init_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(SCHEMA).execute(pool).await?;
    Ok(())
}
