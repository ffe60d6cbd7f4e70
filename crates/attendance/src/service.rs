use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;
use tracing::warn;

use repset_core::{DomainError, TenantId};
use repset_members::MemberId;
use repset_memberships::MembershipId;

use crate::credential::decode_credential;
use crate::log::DenialReason;

/// Member data the check-in path needs, as the directory read model holds it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberRecord {
    pub member_id: MemberId,
    pub first_name: String,
    pub last_name: String,
    pub active: bool,
}

impl MemberRecord {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Assignment data the check-in path needs, as the roster read model holds it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentRecord {
    pub membership_id: MembershipId,
    pub activity: String,
    pub end_date: NaiveDate,
    pub active: bool,
}

/// Member lookup seam, implemented over the member directory projection.
pub trait MemberDirectory {
    fn member(&self, tenant_id: TenantId, member_id: MemberId) -> Option<MemberRecord>;
}

/// Assignment lookup seam, implemented over the roster projection.
pub trait MembershipRoster {
    fn assignments_for(&self, tenant_id: TenantId, member_id: MemberId) -> Vec<AssignmentRecord>;
}

/// Quota left after a successful consumption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumeOutcome {
    pub remaining: u32,
}

/// Write-side seam failures.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The aggregate turned the command down.
    #[error("command rejected: {0}")]
    Rejected(#[from] DomainError),
    /// Someone else won the stream version race; re-dispatch observes
    /// their outcome.
    #[error("stream version conflict")]
    Concurrency,
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

/// Write-side seam: attendance consumption and audit-log appends, implemented
/// over the command dispatcher.
pub trait AttendanceGateway {
    fn consume_attendance(
        &self,
        tenant_id: TenantId,
        membership_id: MembershipId,
        on: NaiveDate,
        at: DateTime<Utc>,
    ) -> Result<ConsumeOutcome, GatewayError>;

    fn record_accepted(
        &self,
        tenant_id: TenantId,
        member_id: MemberId,
        membership_id: MembershipId,
        activity: &str,
        remaining: u32,
        at: DateTime<Utc>,
    ) -> Result<(), GatewayError>;

    fn record_denied(
        &self,
        tenant_id: TenantId,
        member_id: Option<MemberId>,
        reason: DenialReason,
        at: DateTime<Utc>,
    ) -> Result<(), GatewayError>;
}

/// Check-in failure taxonomy, one variant per denial the door can see.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CheckInError {
    #[error("credential could not be read")]
    InvalidCredential,
    #[error("member not found")]
    MemberNotFound,
    #[error("no active membership covers today")]
    NoActiveMembership,
    #[error("attendance quota exceeded")]
    AttendanceQuotaExceeded,
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
}

/// What the scanner displays on admission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckInReceipt {
    pub member_id: MemberId,
    pub member_name: String,
    pub membership_id: MembershipId,
    pub activity: String,
    pub remaining: u32,
    pub at: DateTime<Utc>,
}

const DEFAULT_MAX_RETRIES: usize = 4;

/// Door check-in orchestration: credential → member → assignment → consume,
/// with every outcome (admitted or turned away) appended to the day's log.
pub struct CheckInService<D, R, G> {
    directory: D,
    roster: R,
    gateway: G,
    max_retries: usize,
}

impl<D, R, G> CheckInService<D, R, G>
where
    D: MemberDirectory,
    R: MembershipRoster,
    G: AttendanceGateway,
{
    pub fn new(directory: D, roster: R, gateway: G) -> Self {
        Self {
            directory,
            roster,
            gateway,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn check_in(
        &self,
        tenant_id: TenantId,
        credential: &str,
        now: DateTime<Utc>,
    ) -> Result<CheckInReceipt, CheckInError> {
        let today = now.date_naive();

        let member_id = match decode_credential(credential) {
            Ok(id) => id,
            Err(_) => {
                self.audit_denied(tenant_id, None, DenialReason::InvalidCredential, now);
                return Err(CheckInError::InvalidCredential);
            }
        };

        let Some(member) = self.directory.member(tenant_id, member_id) else {
            self.audit_denied(tenant_id, Some(member_id), DenialReason::MemberNotFound, now);
            return Err(CheckInError::MemberNotFound);
        };
        if !member.active {
            self.audit_denied(
                tenant_id,
                Some(member_id),
                DenialReason::NoActiveMembership,
                now,
            );
            return Err(CheckInError::NoActiveMembership);
        }

        let mut candidates: Vec<AssignmentRecord> = self
            .roster
            .assignments_for(tenant_id, member_id)
            .into_iter()
            .filter(|a| a.active && a.end_date >= today)
            .collect();
        if candidates.is_empty() {
            self.audit_denied(
                tenant_id,
                Some(member_id),
                DenialReason::NoActiveMembership,
                now,
            );
            return Err(CheckInError::NoActiveMembership);
        }

        // Use-it-or-lose-it: spend the assignment that expires first. The
        // membership id breaks ties so concurrent scanners agree.
        candidates.sort_by(|a, b| {
            (a.end_date, a.membership_id.0.as_uuid()).cmp(&(b.end_date, b.membership_id.0.as_uuid()))
        });
        let chosen = &candidates[0];

        let outcome = match self.consume_with_retry(tenant_id, chosen.membership_id, today, now) {
            Ok(outcome) => outcome,
            Err(err) => {
                let reason = match &err {
                    CheckInError::AttendanceQuotaExceeded => DenialReason::QuotaExceeded,
                    _ => DenialReason::BackendUnavailable,
                };
                self.audit_denied(tenant_id, Some(member_id), reason, now);
                return Err(err);
            }
        };

        // The member is already through the door; a failing audit append must
        // not turn the admission into an error.
        if let Err(err) = self.gateway.record_accepted(
            tenant_id,
            member_id,
            chosen.membership_id,
            &chosen.activity,
            outcome.remaining,
            now,
        ) {
            warn!(%tenant_id, %member_id, error = %err, "failed to append accepted check-in");
        }

        Ok(CheckInReceipt {
            member_id,
            member_name: member.display_name(),
            membership_id: chosen.membership_id,
            activity: chosen.activity.clone(),
            remaining: outcome.remaining,
            at: now,
        })
    }

    fn consume_with_retry(
        &self,
        tenant_id: TenantId,
        membership_id: MembershipId,
        on: NaiveDate,
        at: DateTime<Utc>,
    ) -> Result<ConsumeOutcome, CheckInError> {
        let mut attempts = 0;
        loop {
            match self
                .gateway
                .consume_attendance(tenant_id, membership_id, on, at)
            {
                Ok(outcome) => return Ok(outcome),
                // The winner of the race consumed first; the re-dispatch sees
                // the updated quota.
                Err(GatewayError::Concurrency) if attempts < self.max_retries => {
                    attempts += 1;
                }
                Err(GatewayError::Concurrency) => {
                    return Err(CheckInError::BackendUnavailable(
                        "retries exhausted".to_string(),
                    ));
                }
                // Pre-filtered to active in-window assignments, so a rejection
                // here means the quota (or the assignment) ran out underneath
                // us.
                Err(GatewayError::Rejected(_)) => {
                    return Err(CheckInError::AttendanceQuotaExceeded);
                }
                Err(GatewayError::Unavailable(message)) => {
                    return Err(CheckInError::BackendUnavailable(message));
                }
            }
        }
    }

    fn audit_denied(
        &self,
        tenant_id: TenantId,
        member_id: Option<MemberId>,
        reason: DenialReason,
        at: DateTime<Utc>,
    ) {
        if let Err(err) = self.gateway.record_denied(tenant_id, member_id, reason, at) {
            warn!(%tenant_id, ?reason, error = %err, "failed to append denied check-in");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::encode_credential;
    use repset_core::AggregateId;
    use std::collections::HashMap;
    use std::sync::Mutex;

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
        "2025-03-21T10:00:00Z".parse().unwrap()
    }

    fn day(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    struct FakeDirectory {
        members: HashMap<MemberId, MemberRecord>,
    }

    impl MemberDirectory for &FakeDirectory {
        fn member(&self, _tenant_id: TenantId, member_id: MemberId) -> Option<MemberRecord> {
            self.members.get(&member_id).cloned()
        }
    }

    struct FakeRoster {
        assignments: Vec<AssignmentRecord>,
    }

    impl MembershipRoster for &FakeRoster {
        fn assignments_for(
            &self,
            _tenant_id: TenantId,
            _member_id: MemberId,
        ) -> Vec<AssignmentRecord> {
            self.assignments.clone()
        }
    }

    #[derive(Default)]
    struct FakeGateway {
        /// Scripted outcomes for successive consume calls.
        consume_results: Mutex<Vec<Result<ConsumeOutcome, GatewayError>>>,
        consumed: Mutex<Vec<MembershipId>>,
        accepted: Mutex<Vec<(MemberId, u32)>>,
        denied: Mutex<Vec<(Option<MemberId>, DenialReason)>>,
        fail_audit: bool,
    }

    impl AttendanceGateway for &FakeGateway {
        fn consume_attendance(
            &self,
            _tenant_id: TenantId,
            membership_id: MembershipId,
            _on: NaiveDate,
            _at: DateTime<Utc>,
        ) -> Result<ConsumeOutcome, GatewayError> {
            self.consumed.lock().unwrap().push(membership_id);
            self.consume_results.lock().unwrap().remove(0)
        }

        fn record_accepted(
            &self,
            _tenant_id: TenantId,
            member_id: MemberId,
            _membership_id: MembershipId,
            _activity: &str,
            remaining: u32,
            _at: DateTime<Utc>,
        ) -> Result<(), GatewayError> {
            if self.fail_audit {
                return Err(GatewayError::Unavailable("log down".to_string()));
            }
            self.accepted.lock().unwrap().push((member_id, remaining));
            Ok(())
        }

        fn record_denied(
            &self,
            _tenant_id: TenantId,
            member_id: Option<MemberId>,
            reason: DenialReason,
            _at: DateTime<Utc>,
        ) -> Result<(), GatewayError> {
            if self.fail_audit {
                return Err(GatewayError::Unavailable("log down".to_string()));
            }
            self.denied.lock().unwrap().push((member_id, reason));
            Ok(())
        }
    }

    fn world(
        member_id: MemberId,
        assignments: Vec<AssignmentRecord>,
    ) -> (FakeDirectory, FakeRoster, FakeGateway) {
        let mut members = HashMap::new();
        members.insert(
            member_id,
            MemberRecord {
                member_id,
                first_name: "Ana".to_string(),
                last_name: "Lopez".to_string(),
                active: true,
            },
        );
        (
            FakeDirectory { members },
            FakeRoster { assignments },
            FakeGateway::default(),
        )
    }

    fn assignment(membership_id: MembershipId, end_date: NaiveDate) -> AssignmentRecord {
        AssignmentRecord {
            membership_id,
            activity: "Crossfit".to_string(),
            end_date,
            active: true,
        }
    }

    #[test]
    fn successful_check_in_returns_receipt_and_audits() {
        let member_id = test_member_id();
        let membership_id = test_membership_id();
        let (directory, roster, gateway) =
            world(member_id, vec![assignment(membership_id, day("2025-03-31"))]);
        gateway
            .consume_results
            .lock()
            .unwrap()
            .push(Ok(ConsumeOutcome { remaining: 7 }));

        let service = CheckInService::new(&directory, &roster, &gateway);
        let receipt = service
            .check_in(test_tenant_id(), &encode_credential(member_id), test_time())
            .unwrap();

        assert_eq!(receipt.member_id, member_id);
        assert_eq!(receipt.member_name, "Ana Lopez");
        assert_eq!(receipt.membership_id, membership_id);
        assert_eq!(receipt.remaining, 7);
        assert_eq!(*gateway.accepted.lock().unwrap(), vec![(member_id, 7)]);
        assert!(gateway.denied.lock().unwrap().is_empty());
    }

    #[test]
    fn invalid_credential_is_denied_and_audited() {
        let member_id = test_member_id();
        let (directory, roster, gateway) = world(member_id, vec![]);

        let service = CheckInService::new(&directory, &roster, &gateway);
        let err = service
            .check_in(test_tenant_id(), "not-a-credential", test_time())
            .unwrap_err();

        assert_eq!(err, CheckInError::InvalidCredential);
        assert_eq!(
            *gateway.denied.lock().unwrap(),
            vec![(None, DenialReason::InvalidCredential)]
        );
    }

    #[test]
    fn unknown_member_is_denied() {
        let member_id = test_member_id();
        let (directory, roster, gateway) = world(member_id, vec![]);
        let stranger = test_member_id();

        let service = CheckInService::new(&directory, &roster, &gateway);
        let err = service
            .check_in(test_tenant_id(), &encode_credential(stranger), test_time())
            .unwrap_err();

        assert_eq!(err, CheckInError::MemberNotFound);
        assert_eq!(
            *gateway.denied.lock().unwrap(),
            vec![(Some(stranger), DenialReason::MemberNotFound)]
        );
    }

    #[test]
    fn expired_assignments_leave_no_active_membership() {
        let member_id = test_member_id();
        let (directory, roster, gateway) = world(
            member_id,
            vec![assignment(test_membership_id(), day("2025-03-20"))],
        );

        let service = CheckInService::new(&directory, &roster, &gateway);
        let err = service
            .check_in(test_tenant_id(), &encode_credential(member_id), test_time())
            .unwrap_err();

        assert_eq!(err, CheckInError::NoActiveMembership);
        assert!(gateway.consumed.lock().unwrap().is_empty());
    }

    #[test]
    fn soonest_expiring_assignment_is_consumed_first() {
        let member_id = test_member_id();
        let soon = test_membership_id();
        let later = test_membership_id();
        let (directory, roster, gateway) = world(
            member_id,
            vec![
                assignment(later, day("2025-06-30")),
                assignment(soon, day("2025-03-25")),
            ],
        );
        gateway
            .consume_results
            .lock()
            .unwrap()
            .push(Ok(ConsumeOutcome { remaining: 1 }));

        let service = CheckInService::new(&directory, &roster, &gateway);
        let receipt = service
            .check_in(test_tenant_id(), &encode_credential(member_id), test_time())
            .unwrap();

        assert_eq!(receipt.membership_id, soon);
        assert_eq!(*gateway.consumed.lock().unwrap(), vec![soon]);
    }

    #[test]
    fn quota_rejection_maps_to_typed_error_and_audits() {
        let member_id = test_member_id();
        let membership_id = test_membership_id();
        let (directory, roster, gateway) =
            world(member_id, vec![assignment(membership_id, day("2025-03-31"))]);
        gateway.consume_results.lock().unwrap().push(Err(
            GatewayError::Rejected(DomainError::conflict("attendance quota exhausted")),
        ));

        let service = CheckInService::new(&directory, &roster, &gateway);
        let err = service
            .check_in(test_tenant_id(), &encode_credential(member_id), test_time())
            .unwrap_err();

        assert_eq!(err, CheckInError::AttendanceQuotaExceeded);
        assert_eq!(
            *gateway.denied.lock().unwrap(),
            vec![(Some(member_id), DenialReason::QuotaExceeded)]
        );
    }

    #[test]
    fn version_conflicts_are_retried() {
        let member_id = test_member_id();
        let membership_id = test_membership_id();
        let (directory, roster, gateway) =
            world(member_id, vec![assignment(membership_id, day("2025-03-31"))]);
        {
            let mut results = gateway.consume_results.lock().unwrap();
            results.push(Err(GatewayError::Concurrency));
            results.push(Err(GatewayError::Concurrency));
            results.push(Ok(ConsumeOutcome { remaining: 4 }));
        }

        let service = CheckInService::new(&directory, &roster, &gateway);
        let receipt = service
            .check_in(test_tenant_id(), &encode_credential(member_id), test_time())
            .unwrap();

        assert_eq!(receipt.remaining, 4);
        assert_eq!(gateway.consumed.lock().unwrap().len(), 3);
    }

    #[test]
    fn retry_exhaustion_surfaces_backend_unavailable() {
        let member_id = test_member_id();
        let membership_id = test_membership_id();
        let (directory, roster, gateway) =
            world(member_id, vec![assignment(membership_id, day("2025-03-31"))]);
        {
            let mut results = gateway.consume_results.lock().unwrap();
            for _ in 0..3 {
                results.push(Err(GatewayError::Concurrency));
            }
        }

        let service = CheckInService::new(&directory, &roster, &gateway).with_max_retries(2);
        let err = service
            .check_in(test_tenant_id(), &encode_credential(member_id), test_time())
            .unwrap_err();

        match err {
            CheckInError::BackendUnavailable(_) => {}
            _ => panic!("Expected BackendUnavailable after retry exhaustion"),
        }
        // Even an undecidable scan leaves a denied entry in the day's log.
        assert_eq!(
            *gateway.denied.lock().unwrap(),
            vec![(Some(member_id), DenialReason::BackendUnavailable)]
        );
    }

    #[test]
    fn audit_failure_does_not_turn_an_admission_away() {
        let member_id = test_member_id();
        let membership_id = test_membership_id();
        let (directory, roster, mut gateway) =
            world(member_id, vec![assignment(membership_id, day("2025-03-31"))]);
        gateway.fail_audit = true;
        gateway
            .consume_results
            .lock()
            .unwrap()
            .push(Ok(ConsumeOutcome { remaining: 9 }));

        let service = CheckInService::new(&directory, &roster, &gateway);
        let receipt = service
            .check_in(test_tenant_id(), &encode_credential(member_id), test_time())
            .unwrap();

        assert_eq!(receipt.remaining, 9);
    }
}
