//! SQLite analytics warehouse

pub mod init;
pub mod records;
pub mod windows;

pub use init::{create_schema, init_memory_warehouse, init_warehouse};
pub use records::{
    count_events, daily_platform_metrics, events_in_window, stored_timestamp, upsert_record, DailyPlatformMetrics,
};
pub use windows::{get_window, insert_window, list_windows};
