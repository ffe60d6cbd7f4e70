//! Member roster: the per-gym member aggregate.

pub mod member;

pub use member::{
    AccrueDebt, ContactInfo, DeactivateMember, DebtAccrued, DebtSettled, Member, MemberCommand,
    MemberDeactivated, MemberEvent, MemberId, MemberRegistered, MemberStatus, MemberUpdated,
    ReactivateMember, RegisterMember, SettleDebt, UpdateDetails,
};
