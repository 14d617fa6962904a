//! Session keys.

pub const ACCOUNT_ID: &str = "account_id";
