//! Projection implementations (read model builders).
//!
//! Projections consume domain events and build query-optimized read models.
//! All projections are:
//! - **Rebuildable**: Can be reconstructed from the event stream
//! - **Tenant-isolated**: Data is partitioned by tenant
//! - **Idempotent**: Safe for at-least-once delivery

pub mod cursor;

pub mod attendance_feed;
pub mod daily_cash;
pub mod member_directory;
pub mod membership_roster;

pub use attendance_feed::{
    AttendanceEntry, AttendanceFeedError, AttendanceFeedProjection, DayFeed, EntryOutcome,
};
pub use cursor::{CursorDecision, StreamCursors};
pub use daily_cash::{DailyCashProjectionError, DailyCashView, DailyCashViewProjection};
pub use member_directory::{MemberDirectoryError, MemberDirectoryProjection, MemberView};
pub use membership_roster::{AssignmentView, MembershipRosterError, MembershipRosterProjection};
