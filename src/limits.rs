//! Numeric guard rails. Writes exceeding these are rejected with
//! `EngineError::LimitExceeded` before anything touches the WAL.

pub const MAX_UNITS_PER_COMPANY: usize = 10_000;
pub const MAX_BOOKINGS_PER_UNIT: usize = 50_000;
pub const MAX_ISSUES_PER_UNIT: usize = 50_000;
pub const MAX_SOURCES_PER_UNIT: usize = 16;

pub const MAX_NAME_LEN: usize = 256;
pub const MAX_NOTES_LEN: usize = 4096;

/// Longest accepted stay, in nights.
pub const MAX_STAY_NIGHTS: i64 = 730;

/// Largest accepted ICS feed.
pub const MAX_FEED_BYTES: usize = 4 * 1024 * 1024;

pub const MAX_IMPORT_RECORDS: usize = 10_000;

pub const MAX_COMPANIES: usize = 1024;
pub const MAX_COMPANY_NAME_LEN: usize = 256;
