use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use repset_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use repset_events::Event;
use repset_members::MemberId;

/// Membership assignment identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MembershipId(pub AggregateId);

impl MembershipId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for MembershipId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Assignment lifecycle. Active assignments can only move to Expired or
/// Cancelled; both are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipStatus {
    Active,
    Expired,
    Cancelled,
}

/// Whether the plan was paid up front or left as member debt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Paid,
    Pending,
}

/// Aggregate root: a plan assigned to a member for a date window, with an
/// attendance quota that check-ins consume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipAssignment {
    id: MembershipId,
    tenant_id: Option<TenantId>,
    member_id: Option<MemberId>,
    activity: String,
    start_date: NaiveDate,
    end_date: NaiveDate,
    cost: i64,
    payment_status: PaymentStatus,
    status: MembershipStatus,
    max_attendances: u32,
    current_attendances: u32,
    version: u64,
    created: bool,
}

impl MembershipAssignment {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: MembershipId) -> Self {
        Self {
            id,
            tenant_id: None,
            member_id: None,
            activity: String::new(),
            start_date: NaiveDate::MIN,
            end_date: NaiveDate::MIN,
            cost: 0,
            payment_status: PaymentStatus::Paid,
            status: MembershipStatus::Active,
            max_attendances: 0,
            current_attendances: 0,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> MembershipId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn member_id(&self) -> Option<MemberId> {
        self.member_id
    }

    pub fn activity(&self) -> &str {
        &self.activity
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start_date
    }

    pub fn end_date(&self) -> NaiveDate {
        self.end_date
    }

    pub fn cost(&self) -> i64 {
        self.cost
    }

    pub fn payment_status(&self) -> PaymentStatus {
        self.payment_status
    }

    pub fn status(&self) -> MembershipStatus {
        self.status
    }

    pub fn max_attendances(&self) -> u32 {
        self.max_attendances
    }

    pub fn current_attendances(&self) -> u32 {
        self.current_attendances
    }

    /// Attendances left on the quota.
    pub fn remaining_attendances(&self) -> u32 {
        self.max_attendances.saturating_sub(self.current_attendances)
    }

    /// Invariant helper: whether a check-in on `date` may consume from this
    /// assignment. The quota itself is re-checked in `handle`, under the
    /// stream's expected version, so concurrent scans cannot overrun it.
    pub fn admits_on(&self, date: NaiveDate) -> bool {
        self.status == MembershipStatus::Active
            && date >= self.start_date
            && date <= self.end_date
            && self.current_attendances < self.max_attendances
    }
}

impl AggregateRoot for MembershipAssignment {
    type Id = MembershipId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: AssignMembership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignMembership {
    pub tenant_id: TenantId,
    pub membership_id: MembershipId,
    pub member_id: MemberId,
    pub activity: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Plan cost in cents.
    pub cost: i64,
    pub payment_status: PaymentStatus,
    pub max_attendances: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ConsumeAttendance. One unit of the quota, dated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumeAttendance {
    pub tenant_id: TenantId,
    pub membership_id: MembershipId,
    pub on: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ExpireMembership (date-based sweep).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpireMembership {
    pub tenant_id: TenantId,
    pub membership_id: MembershipId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelMembership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelMembership {
    pub tenant_id: TenantId,
    pub membership_id: MembershipId,
    /// Refund issued to the member, in cents, if any.
    pub refund: Option<i64>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MembershipCommand {
    AssignMembership(AssignMembership),
    ConsumeAttendance(ConsumeAttendance),
    ExpireMembership(ExpireMembership),
    CancelMembership(CancelMembership),
}

/// Event: MembershipAssigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipAssigned {
    pub tenant_id: TenantId,
    pub membership_id: MembershipId,
    pub member_id: MemberId,
    pub activity: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub cost: i64,
    pub payment_status: PaymentStatus,
    pub max_attendances: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Event: AttendanceConsumed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceConsumed {
    pub tenant_id: TenantId,
    pub membership_id: MembershipId,
    pub member_id: MemberId,
    pub on: NaiveDate,
    /// Quota left after this consumption.
    pub remaining: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Event: MembershipExpired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipExpired {
    pub tenant_id: TenantId,
    pub membership_id: MembershipId,
    pub member_id: MemberId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: MembershipCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipCancelled {
    pub tenant_id: TenantId,
    pub membership_id: MembershipId,
    pub member_id: MemberId,
    pub refund: Option<i64>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MembershipEvent {
    MembershipAssigned(MembershipAssigned),
    AttendanceConsumed(AttendanceConsumed),
    MembershipExpired(MembershipExpired),
    MembershipCancelled(MembershipCancelled),
}

impl Event for MembershipEvent {
    fn event_type(&self) -> &'static str {
        match self {
            MembershipEvent::MembershipAssigned(_) => "memberships.assignment.assigned",
            MembershipEvent::AttendanceConsumed(_) => "memberships.assignment.attendance_consumed",
            MembershipEvent::MembershipExpired(_) => "memberships.assignment.expired",
            MembershipEvent::MembershipCancelled(_) => "memberships.assignment.cancelled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            MembershipEvent::MembershipAssigned(e) => e.occurred_at,
            MembershipEvent::AttendanceConsumed(e) => e.occurred_at,
            MembershipEvent::MembershipExpired(e) => e.occurred_at,
            MembershipEvent::MembershipCancelled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for MembershipAssignment {
    type Command = MembershipCommand;
    type Event = MembershipEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            MembershipEvent::MembershipAssigned(e) => {
                self.id = e.membership_id;
                self.tenant_id = Some(e.tenant_id);
                self.member_id = Some(e.member_id);
                self.activity = e.activity.clone();
                self.start_date = e.start_date;
                self.end_date = e.end_date;
                self.cost = e.cost;
                self.payment_status = e.payment_status;
                self.status = MembershipStatus::Active;
                self.max_attendances = e.max_attendances;
                self.current_attendances = 0;
                self.created = true;
            }
            MembershipEvent::AttendanceConsumed(_) => {
                self.current_attendances += 1;
            }
            MembershipEvent::MembershipExpired(_) => {
                self.status = MembershipStatus::Expired;
            }
            MembershipEvent::MembershipCancelled(_) => {
                self.status = MembershipStatus::Cancelled;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            MembershipCommand::AssignMembership(cmd) => self.handle_assign(cmd),
            MembershipCommand::ConsumeAttendance(cmd) => self.handle_consume(cmd),
            MembershipCommand::ExpireMembership(cmd) => self.handle_expire(cmd),
            MembershipCommand::CancelMembership(cmd) => self.handle_cancel(cmd),
        }
    }
}

impl MembershipAssignment {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn ensure_membership_id(&self, membership_id: MembershipId) -> Result<(), DomainError> {
        if self.id != membership_id {
            return Err(DomainError::invariant("membership_id mismatch"));
        }
        Ok(())
    }

    fn ensure_created(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        Ok(())
    }

    fn member_id_or_invariant(&self) -> Result<MemberId, DomainError> {
        self.member_id
            .ok_or_else(|| DomainError::invariant("assignment has no member"))
    }

    fn handle_assign(&self, cmd: &AssignMembership) -> Result<Vec<MembershipEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("membership already assigned"));
        }
        if cmd.activity.trim().is_empty() {
            return Err(DomainError::validation("activity cannot be empty"));
        }
        if cmd.end_date < cmd.start_date {
            return Err(DomainError::validation("end_date precedes start_date"));
        }
        if cmd.cost < 0 {
            return Err(DomainError::validation("cost cannot be negative"));
        }
        if cmd.max_attendances == 0 {
            return Err(DomainError::validation("max_attendances must be positive"));
        }

        Ok(vec![MembershipEvent::MembershipAssigned(MembershipAssigned {
            tenant_id: cmd.tenant_id,
            membership_id: cmd.membership_id,
            member_id: cmd.member_id,
            activity: cmd.activity.clone(),
            start_date: cmd.start_date,
            end_date: cmd.end_date,
            cost: cmd.cost,
            payment_status: cmd.payment_status,
            max_attendances: cmd.max_attendances,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_consume(&self, cmd: &ConsumeAttendance) -> Result<Vec<MembershipEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_membership_id(cmd.membership_id)?;
        let member_id = self.member_id_or_invariant()?;

        if self.status != MembershipStatus::Active {
            return Err(DomainError::conflict("membership is not active"));
        }
        if cmd.on < self.start_date {
            return Err(DomainError::validation("membership has not started"));
        }
        if cmd.on > self.end_date {
            return Err(DomainError::conflict("membership window has ended"));
        }
        // The quota guard. Commits only under the stream's expected version,
        // so a concurrent consumption forces a conflict and a re-check.
        if self.current_attendances >= self.max_attendances {
            return Err(DomainError::conflict("attendance quota exhausted"));
        }

        let remaining = self.max_attendances - self.current_attendances - 1;
        let mut events = vec![MembershipEvent::AttendanceConsumed(AttendanceConsumed {
            tenant_id: cmd.tenant_id,
            membership_id: cmd.membership_id,
            member_id,
            on: cmd.on,
            remaining,
            occurred_at: cmd.occurred_at,
        })];

        // The consumption that drains the quota also retires the assignment.
        if remaining == 0 {
            events.push(MembershipEvent::MembershipExpired(MembershipExpired {
                tenant_id: cmd.tenant_id,
                membership_id: cmd.membership_id,
                member_id,
                occurred_at: cmd.occurred_at,
            }));
        }

        Ok(events)
    }

    fn handle_expire(&self, cmd: &ExpireMembership) -> Result<Vec<MembershipEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_membership_id(cmd.membership_id)?;
        let member_id = self.member_id_or_invariant()?;

        if self.status != MembershipStatus::Active {
            return Err(DomainError::conflict("membership is not active"));
        }

        Ok(vec![MembershipEvent::MembershipExpired(MembershipExpired {
            tenant_id: cmd.tenant_id,
            membership_id: cmd.membership_id,
            member_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelMembership) -> Result<Vec<MembershipEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_membership_id(cmd.membership_id)?;
        let member_id = self.member_id_or_invariant()?;

        if self.status != MembershipStatus::Active {
            return Err(DomainError::conflict("membership is not active"));
        }
        if let Some(refund) = cmd.refund {
            if refund < 0 {
                return Err(DomainError::validation("refund cannot be negative"));
            }
        }

        Ok(vec![MembershipEvent::MembershipCancelled(MembershipCancelled {
            tenant_id: cmd.tenant_id,
            membership_id: cmd.membership_id,
            member_id,
            refund: cmd.refund,
            occurred_at: cmd.occurred_at,
        })])
    }
}
