use chrono::NaiveDate;
use serde_json::Value as JsonValue;
use thiserror::Error;

use repset_core::TenantId;
use repset_events::EventEnvelope;
use repset_members::MemberId;
use repset_memberships::{MembershipEvent, MembershipId, MembershipStatus, PaymentStatus};

use crate::projections::cursor::{CursorDecision, StreamCursors};
use crate::read_model::TenantStore;

/// Queryable membership assignment record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentView {
    pub membership_id: MembershipId,
    pub member_id: MemberId,
    pub activity: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub cost: i64,
    pub payment_status: PaymentStatus,
    pub status: MembershipStatus,
    pub max_attendances: u32,
    pub remaining_attendances: u32,
}

impl AssignmentView {
    /// Whether this assignment can admit a visit on `date`.
    pub fn admits_on(&self, date: NaiveDate) -> bool {
        self.status == MembershipStatus::Active
            && date >= self.start_date
            && date <= self.end_date
            && self.remaining_attendances > 0
    }
}

#[derive(Debug, Error)]
pub enum MembershipRosterError {
    #[error("failed to deserialize membership event: {0}")]
    Deserialize(String),

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Membership roster projection.
///
/// Maintains a tenant-isolated view of membership assignments, indexed by
/// assignment id, with a per-member listing used during check-in resolution.
#[derive(Debug)]
pub struct MembershipRosterProjection<S>
where
    S: TenantStore<MembershipId, AssignmentView>,
{
    store: S,
    cursors: StreamCursors,
}

impl<S> MembershipRosterProjection<S>
where
    S: TenantStore<MembershipId, AssignmentView>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, tenant_id: TenantId, membership_id: &MembershipId) -> Option<AssignmentView> {
        self.store.get(tenant_id, membership_id)
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<AssignmentView> {
        self.store.list(tenant_id)
    }

    /// All assignments held by one member.
    pub fn list_for_member(&self, tenant_id: TenantId, member_id: MemberId) -> Vec<AssignmentView> {
        self.list(tenant_id)
            .into_iter()
            .filter(|view| view.member_id == member_id)
            .collect()
    }

    /// Apply a published envelope into the projection.
    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), MembershipRosterError> {
        if envelope.aggregate_type() != "memberships.assignment" {
            return Ok(());
        }

        let tenant_id = envelope.tenant_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        match self.cursors.check(tenant_id, aggregate_id, seq) {
            CursorDecision::Duplicate => return Ok(()),
            CursorDecision::OutOfOrder { last } => {
                return Err(MembershipRosterError::NonMonotonicSequence { last, found: seq });
            }
            CursorDecision::Apply => {}
        }

        let event: MembershipEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| MembershipRosterError::Deserialize(e.to_string()))?;

        let (event_tenant, membership_id) = match &event {
            MembershipEvent::MembershipAssigned(e) => (e.tenant_id, e.membership_id),
            MembershipEvent::AttendanceConsumed(e) => (e.tenant_id, e.membership_id),
            MembershipEvent::MembershipExpired(e) => (e.tenant_id, e.membership_id),
            MembershipEvent::MembershipCancelled(e) => (e.tenant_id, e.membership_id),
        };

        if event_tenant != tenant_id {
            return Err(MembershipRosterError::TenantIsolation(
                "event tenant_id does not match envelope tenant_id".to_string(),
            ));
        }

        if membership_id.0 != aggregate_id {
            return Err(MembershipRosterError::TenantIsolation(
                "event membership_id does not match envelope aggregate_id".to_string(),
            ));
        }

        match event {
            MembershipEvent::MembershipAssigned(e) => {
                self.store.upsert(
                    tenant_id,
                    e.membership_id,
                    AssignmentView {
                        membership_id: e.membership_id,
                        member_id: e.member_id,
                        activity: e.activity,
                        start_date: e.start_date,
                        end_date: e.end_date,
                        cost: e.cost,
                        payment_status: e.payment_status,
                        status: MembershipStatus::Active,
                        max_attendances: e.max_attendances,
                        remaining_attendances: e.max_attendances,
                    },
                );
            }
            MembershipEvent::AttendanceConsumed(e) => {
                if let Some(mut view) = self.store.get(tenant_id, &e.membership_id) {
                    view.remaining_attendances = e.remaining;
                    self.store.upsert(tenant_id, e.membership_id, view);
                }
            }
            MembershipEvent::MembershipExpired(e) => {
                if let Some(mut view) = self.store.get(tenant_id, &e.membership_id) {
                    view.status = MembershipStatus::Expired;
                    self.store.upsert(tenant_id, e.membership_id, view);
                }
            }
            MembershipEvent::MembershipCancelled(e) => {
                if let Some(mut view) = self.store.get(tenant_id, &e.membership_id) {
                    view.status = MembershipStatus::Cancelled;
                    self.store.upsert(tenant_id, e.membership_id, view);
                }
            }
        }

        self.cursors.advance(tenant_id, aggregate_id, seq);
        Ok(())
    }

    /// Rebuild the read model from scratch by replaying envelopes.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), MembershipRosterError> {
        let mut envs: Vec<_> = envelopes.into_iter().collect();

        let mut tenants = envs.iter().map(|e| e.tenant_id()).collect::<Vec<_>>();
        tenants.sort_by_key(|t| *t.as_uuid().as_bytes());
        tenants.dedup();
        for tenant in tenants {
            self.store.clear_tenant(tenant);
            self.cursors.clear_tenant(tenant);
        }

        envs.sort_by_key(|e| {
            (
                *e.tenant_id().as_uuid().as_bytes(),
                *e.aggregate_id().as_uuid().as_bytes(),
                e.sequence_number(),
            )
        });

        for env in &envs {
            self.apply_envelope(env)?;
        }

        Ok(())
    }
}
