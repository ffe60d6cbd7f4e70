//! Membership assignments: plan-to-member bindings with attendance quotas.

pub mod assignment;

pub use assignment::{
    AssignMembership, AttendanceConsumed, CancelMembership, ConsumeAttendance, ExpireMembership,
    MembershipAssigned, MembershipAssignment, MembershipCancelled, MembershipCommand,
    MembershipEvent, MembershipExpired, MembershipId, MembershipStatus, PaymentStatus,
};
