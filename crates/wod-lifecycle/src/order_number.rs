//! Order number formatting.
//!
//! Numbers read `ORD<yyyyMMdd><counter>` with the counter zero-padded to
//! four digits. The counter comes from a persistent, transactionally
//! allocated sequence (Postgres `order_number_seq`, or an atomic counter in
//! the in-memory desk), so numbers stay collision-free across restarts and
//! concurrent creation — the sequence never resets, it only grows. Past
//! 9999 the counter simply widens; uniqueness is what matters, and the
//! unique index on `order_number` backstops it.

use chrono::NaiveDate;

pub fn format_order_number(date: NaiveDate, seq: i64) -> String {
    format!("ORD{}{:04}", date.format("%Y%m%d"), seq)
}
