pub mod address;
pub mod history;
pub mod staged_file;

pub use address::{Address, AddressStatus, NewAddress};
pub use history::{EmailHistoryRecord, HistoryStatus, SendAttempt};
pub use staged_file::StagedFile;

/// Renders a unix timestamp as RFC 3339 in UTC.
pub fn iso_timestamp(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .unwrap_or_default()
        .to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}
