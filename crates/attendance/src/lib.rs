//! Door check-in: credential decoding, the per-day attendance audit log,
//! and the check-in orchestration service.

pub mod credential;
pub mod log;
pub mod service;

pub use credential::{InvalidCredential, decode_credential, encode_credential};
pub use log::{
    AttendanceCommand, AttendanceEvent, AttendanceLog, AttendanceLogId, CheckInAccepted,
    CheckInDenied, DenialReason, RecordAcceptedCheckIn, RecordDeniedCheckIn, attendance_stream_id,
};
pub use service::{
    AssignmentRecord, AttendanceGateway, CheckInError, CheckInReceipt, CheckInService,
    ConsumeOutcome, GatewayError, MemberDirectory, MemberRecord, MembershipRoster,
};
