use serde_json::Value as JsonValue;
use thiserror::Error;

use repset_events::EventEnvelope;
use repset_members::{MemberEvent, MemberId, MemberStatus};
use repset_core::TenantId;

use crate::projections::cursor::{CursorDecision, StreamCursors};
use crate::read_model::TenantStore;

/// Queryable member record: directory entry for front-desk lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberView {
    pub member_id: MemberId,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub status: MemberStatus,
    pub total_debt: i64,
}

impl MemberView {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Error)]
pub enum MemberDirectoryError {
    #[error("failed to deserialize member event: {0}")]
    Deserialize(String),

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Member directory projection.
///
/// Consumes published envelopes (JSON payloads) and maintains a tenant-isolated
/// member read model suitable for lookup, listing and name search.
#[derive(Debug)]
pub struct MemberDirectoryProjection<S>
where
    S: TenantStore<MemberId, MemberView>,
{
    store: S,
    cursors: StreamCursors,
}

impl<S> MemberDirectoryProjection<S>
where
    S: TenantStore<MemberId, MemberView>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, tenant_id: TenantId, member_id: &MemberId) -> Option<MemberView> {
        self.store.get(tenant_id, member_id)
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<MemberView> {
        self.store.list(tenant_id)
    }

    /// Case-insensitive substring search over full names for a tenant.
    pub fn search_by_name(&self, tenant_id: TenantId, query: &str) -> Vec<MemberView> {
        let q = query.to_lowercase();
        self.list(tenant_id)
            .into_iter()
            .filter(|view| view.full_name().to_lowercase().contains(&q))
            .collect()
    }

    /// Apply a published envelope into the projection.
    ///
    /// - Ignores other aggregate types (allows sharing a bus across modules).
    /// - Enforces tenant isolation and monotonic per-stream sequences.
    /// - Idempotent for at-least-once delivery (replays <= cursor are ignored).
    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), MemberDirectoryError> {
        if envelope.aggregate_type() != "members.member" {
            return Ok(());
        }

        let tenant_id = envelope.tenant_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        match self.cursors.check(tenant_id, aggregate_id, seq) {
            CursorDecision::Duplicate => return Ok(()),
            CursorDecision::OutOfOrder { last } => {
                return Err(MemberDirectoryError::NonMonotonicSequence { last, found: seq });
            }
            CursorDecision::Apply => {}
        }

        let event: MemberEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| MemberDirectoryError::Deserialize(e.to_string()))?;

        let (event_tenant, member_id) = match &event {
            MemberEvent::MemberRegistered(e) => (e.tenant_id, e.member_id),
            MemberEvent::MemberUpdated(e) => (e.tenant_id, e.member_id),
            MemberEvent::MemberDeactivated(e) => (e.tenant_id, e.member_id),
            MemberEvent::MemberReactivated(e) => (e.tenant_id, e.member_id),
            MemberEvent::DebtAccrued(e) => (e.tenant_id, e.member_id),
            MemberEvent::DebtSettled(e) => (e.tenant_id, e.member_id),
        };

        if event_tenant != tenant_id {
            return Err(MemberDirectoryError::TenantIsolation(
                "event tenant_id does not match envelope tenant_id".to_string(),
            ));
        }

        if member_id.0 != aggregate_id {
            return Err(MemberDirectoryError::TenantIsolation(
                "event member_id does not match envelope aggregate_id".to_string(),
            ));
        }

        match event {
            MemberEvent::MemberRegistered(e) => {
                self.store.upsert(
                    tenant_id,
                    e.member_id,
                    MemberView {
                        member_id: e.member_id,
                        first_name: e.first_name,
                        last_name: e.last_name,
                        email: e.contact.email,
                        phone: e.contact.phone,
                        status: MemberStatus::Active,
                        total_debt: 0,
                    },
                );
            }
            MemberEvent::MemberUpdated(e) => {
                if let Some(mut view) = self.store.get(tenant_id, &e.member_id) {
                    view.first_name = e.first_name;
                    view.last_name = e.last_name;
                    view.email = e.contact.email;
                    view.phone = e.contact.phone;
                    self.store.upsert(tenant_id, e.member_id, view);
                }
            }
            MemberEvent::MemberDeactivated(e) => {
                if let Some(mut view) = self.store.get(tenant_id, &e.member_id) {
                    view.status = MemberStatus::Inactive;
                    self.store.upsert(tenant_id, e.member_id, view);
                }
            }
            MemberEvent::MemberReactivated(e) => {
                if let Some(mut view) = self.store.get(tenant_id, &e.member_id) {
                    view.status = MemberStatus::Active;
                    self.store.upsert(tenant_id, e.member_id, view);
                }
            }
            MemberEvent::DebtAccrued(e) => {
                if let Some(mut view) = self.store.get(tenant_id, &e.member_id) {
                    view.total_debt += e.amount;
                    self.store.upsert(tenant_id, e.member_id, view);
                }
            }
            MemberEvent::DebtSettled(e) => {
                if let Some(mut view) = self.store.get(tenant_id, &e.member_id) {
                    view.total_debt = e.remaining_debt;
                    self.store.upsert(tenant_id, e.member_id, view);
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
    ) -> Result<(), MemberDirectoryError> {
        let mut envs: Vec<_> = envelopes.into_iter().collect();

        let mut tenants = envs.iter().map(|e| e.tenant_id()).collect::<Vec<_>>();
        tenants.sort_by_key(|t| *t.as_uuid().as_bytes());
        tenants.dedup();
        for tenant in tenants {
            self.store.clear_tenant(tenant);
            self.cursors.clear_tenant(tenant);
        }

        // Deterministic replay order: tenant, aggregate, sequence.
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
