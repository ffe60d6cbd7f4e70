use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use repset_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use repset_events::Event;
use repset_members::MemberId;
use repset_memberships::MembershipId;

/// Namespace for date-keyed attendance log stream ids.
const LOG_STREAM_NAMESPACE: Uuid = uuid::uuid!("c6a0b9d4-2e71-4c52-8d0f-9b64f3a7c215");

/// Deterministic stream id for a tenant's attendance log on a given day.
pub fn attendance_stream_id(tenant_id: TenantId, date: NaiveDate) -> AttendanceLogId {
    let name = format!("{}:{}", tenant_id, date.format("%Y-%m-%d"));
    AttendanceLogId(AggregateId::from_uuid(Uuid::new_v5(
        &LOG_STREAM_NAMESPACE,
        name.as_bytes(),
    )))
}

/// Attendance log identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttendanceLogId(pub AggregateId);

impl AttendanceLogId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for AttendanceLogId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Why a scan was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    InvalidCredential,
    MemberNotFound,
    NoActiveMembership,
    QuotaExceeded,
    /// The write path could not decide (retries exhausted or store down);
    /// the member was turned away without consuming anything.
    BackendUnavailable,
}

/// Aggregate root: one gym's check-in audit trail for one calendar day.
///
/// Append-only. Denied attempts are recorded with the same weight as
/// admissions; nothing is ever rewritten.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendanceLog {
    id: AttendanceLogId,
    tenant_id: Option<TenantId>,
    date: NaiveDate,
    accepted_count: u32,
    denied_count: u32,
    version: u64,
    created: bool,
}

impl AttendanceLog {
    /// Empty aggregate for rehydration.
    pub fn empty(id: AttendanceLogId) -> Self {
        Self {
            id,
            tenant_id: None,
            date: NaiveDate::MIN,
            accepted_count: 0,
            denied_count: 0,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> AttendanceLogId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn accepted_count(&self) -> u32 {
        self.accepted_count
    }

    pub fn denied_count(&self) -> u32 {
        self.denied_count
    }
}

impl AggregateRoot for AttendanceLog {
    type Id = AttendanceLogId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RecordAcceptedCheckIn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordAcceptedCheckIn {
    pub tenant_id: TenantId,
    pub log_id: AttendanceLogId,
    pub date: NaiveDate,
    pub member_id: MemberId,
    pub membership_id: MembershipId,
    pub activity: String,
    /// Attendances left on the membership after this admission.
    pub remaining: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordDeniedCheckIn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordDeniedCheckIn {
    pub tenant_id: TenantId,
    pub log_id: AttendanceLogId,
    pub date: NaiveDate,
    /// Unset when the credential never resolved to a member.
    pub member_id: Option<MemberId>,
    pub reason: DenialReason,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttendanceCommand {
    RecordAcceptedCheckIn(RecordAcceptedCheckIn),
    RecordDeniedCheckIn(RecordDeniedCheckIn),
}

/// Event: CheckInAccepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckInAccepted {
    pub tenant_id: TenantId,
    pub log_id: AttendanceLogId,
    pub date: NaiveDate,
    pub member_id: MemberId,
    pub membership_id: MembershipId,
    pub activity: String,
    pub remaining: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CheckInDenied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckInDenied {
    pub tenant_id: TenantId,
    pub log_id: AttendanceLogId,
    pub date: NaiveDate,
    pub member_id: Option<MemberId>,
    pub reason: DenialReason,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttendanceEvent {
    CheckInAccepted(CheckInAccepted),
    CheckInDenied(CheckInDenied),
}

impl Event for AttendanceEvent {
    fn event_type(&self) -> &'static str {
        match self {
            AttendanceEvent::CheckInAccepted(_) => "attendance.log.check_in_accepted",
            AttendanceEvent::CheckInDenied(_) => "attendance.log.check_in_denied",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            AttendanceEvent::CheckInAccepted(e) => e.occurred_at,
            AttendanceEvent::CheckInDenied(e) => e.occurred_at,
        }
    }
}

impl Aggregate for AttendanceLog {
    type Command = AttendanceCommand;
    type Event = AttendanceEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            AttendanceEvent::CheckInAccepted(e) => {
                self.id = e.log_id;
                if self.tenant_id.is_none() {
                    self.tenant_id = Some(e.tenant_id);
                    self.date = e.date;
                    self.created = true;
                }
                self.accepted_count += 1;
            }
            AttendanceEvent::CheckInDenied(e) => {
                self.id = e.log_id;
                if self.tenant_id.is_none() {
                    self.tenant_id = Some(e.tenant_id);
                    self.date = e.date;
                    self.created = true;
                }
                self.denied_count += 1;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            AttendanceCommand::RecordAcceptedCheckIn(cmd) => self.handle_accepted(cmd),
            AttendanceCommand::RecordDeniedCheckIn(cmd) => self.handle_denied(cmd),
        }
    }
}

impl AttendanceLog {
    fn ensure_stream(
        &self,
        tenant_id: TenantId,
        log_id: AttendanceLogId,
        date: NaiveDate,
    ) -> Result<(), DomainError> {
        if self.id != log_id {
            return Err(DomainError::invariant("log_id mismatch"));
        }
        if !self.created {
            return Ok(());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.date != date {
            return Err(DomainError::invariant("date mismatch"));
        }
        Ok(())
    }

    fn handle_accepted(
        &self,
        cmd: &RecordAcceptedCheckIn,
    ) -> Result<Vec<AttendanceEvent>, DomainError> {
        self.ensure_stream(cmd.tenant_id, cmd.log_id, cmd.date)?;

        Ok(vec![AttendanceEvent::CheckInAccepted(CheckInAccepted {
            tenant_id: cmd.tenant_id,
            log_id: cmd.log_id,
            date: cmd.date,
            member_id: cmd.member_id,
            membership_id: cmd.membership_id,
            activity: cmd.activity.clone(),
            remaining: cmd.remaining,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_denied(
        &self,
        cmd: &RecordDeniedCheckIn,
    ) -> Result<Vec<AttendanceEvent>, DomainError> {
        self.ensure_stream(cmd.tenant_id, cmd.log_id, cmd.date)?;

        Ok(vec![AttendanceEvent::CheckInDenied(CheckInDenied {
            tenant_id: cmd.tenant_id,
            log_id: cmd.log_id,
            date: cmd.date,
            member_id: cmd.member_id,
            reason: cmd.reason,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_tenant_id() -> TenantId {
        TenantId::new()
    }

    fn test_member_id() -> MemberId {
        MemberId::new(AggregateId::new())
    }

    fn test_membership_id() -> MembershipId {
        MembershipId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn day(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn attendance_stream_id_is_deterministic() {
        let tenant_id = test_tenant_id();
        let date = day("2025-03-21");
        assert_eq!(
            attendance_stream_id(tenant_id, date),
            attendance_stream_id(tenant_id, date)
        );
        assert_ne!(
            attendance_stream_id(tenant_id, date),
            attendance_stream_id(tenant_id, day("2025-03-22"))
        );
    }

    #[test]
    fn first_record_creates_the_day_log() {
        let tenant_id = test_tenant_id();
        let date = day("2025-03-21");
        let log_id = attendance_stream_id(tenant_id, date);
        let mut log = AttendanceLog::empty(log_id);

        let cmd = RecordAcceptedCheckIn {
            tenant_id,
            log_id,
            date,
            member_id: test_member_id(),
            membership_id: test_membership_id(),
            activity: "Crossfit".to_string(),
            remaining: 7,
            occurred_at: test_time(),
        };
        let events = log
            .handle(&AttendanceCommand::RecordAcceptedCheckIn(cmd))
            .unwrap();
        assert_eq!(events.len(), 1);
        log.apply(&events[0]);

        assert_eq!(log.tenant_id(), Some(tenant_id));
        assert_eq!(log.date(), date);
        assert_eq!(log.accepted_count(), 1);
        assert_eq!(log.denied_count(), 0);
        assert_eq!(log.version(), 1);
    }

    #[test]
    fn denied_attempts_are_recorded_alongside_admissions() {
        let tenant_id = test_tenant_id();
        let date = day("2025-03-21");
        let log_id = attendance_stream_id(tenant_id, date);
        let mut log = AttendanceLog::empty(log_id);

        let denied = RecordDeniedCheckIn {
            tenant_id,
            log_id,
            date,
            member_id: None,
            reason: DenialReason::InvalidCredential,
            occurred_at: test_time(),
        };
        let events = log
            .handle(&AttendanceCommand::RecordDeniedCheckIn(denied))
            .unwrap();
        log.apply(&events[0]);

        match &events[0] {
            AttendanceEvent::CheckInDenied(e) => {
                assert_eq!(e.member_id, None);
                assert_eq!(e.reason, DenialReason::InvalidCredential);
            }
            _ => panic!("Expected CheckInDenied event"),
        }

        let accepted = RecordAcceptedCheckIn {
            tenant_id,
            log_id,
            date,
            member_id: test_member_id(),
            membership_id: test_membership_id(),
            activity: "Spinning".to_string(),
            remaining: 3,
            occurred_at: test_time(),
        };
        let events = log
            .handle(&AttendanceCommand::RecordAcceptedCheckIn(accepted))
            .unwrap();
        log.apply(&events[0]);

        assert_eq!(log.accepted_count(), 1);
        assert_eq!(log.denied_count(), 1);
        assert_eq!(log.version(), 2);
    }

    #[test]
    fn records_for_another_day_are_rejected() {
        let tenant_id = test_tenant_id();
        let date = day("2025-03-21");
        let log_id = attendance_stream_id(tenant_id, date);
        let mut log = AttendanceLog::empty(log_id);

        let first = RecordDeniedCheckIn {
            tenant_id,
            log_id,
            date,
            member_id: None,
            reason: DenialReason::MemberNotFound,
            occurred_at: test_time(),
        };
        let events = log
            .handle(&AttendanceCommand::RecordDeniedCheckIn(first))
            .unwrap();
        log.apply(&events[0]);

        let wrong_day = RecordDeniedCheckIn {
            tenant_id,
            log_id,
            date: day("2025-03-22"),
            member_id: None,
            reason: DenialReason::MemberNotFound,
            occurred_at: test_time(),
        };
        let err = log
            .handle(&AttendanceCommand::RecordDeniedCheckIn(wrong_day))
            .unwrap_err();
        match err {
            DomainError::InvariantViolation(_) => {}
            _ => panic!("Expected InvariantViolation for mismatched date"),
        }
    }
}
