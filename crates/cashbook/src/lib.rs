//! Daily cash ledger: one append-only ledger per gym per calendar day.

pub mod daily_cash;
pub mod summary;
pub mod transaction;

pub use daily_cash::{
    CloseDailyCash, DailyCash, DailyCashClosed, DailyCashCommand, DailyCashEvent, DailyCashId,
    DailyCashOpened, DailyCashStatus, OpenDailyCash, RecordTransaction, TransactionRecorded,
    day_stream_id,
};
pub use summary::{RangeSummary, summarize};
pub use transaction::{Actor, PaymentMethod, TransactionCategory, TransactionEntry, TransactionKind};
