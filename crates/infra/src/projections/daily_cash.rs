use chrono::NaiveDate;
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use repset_cashbook::{
    summarize, DailyCashEvent, DailyCashId, DailyCashStatus, RangeSummary, TransactionEntry,
    TransactionKind,
};
use repset_core::TenantId;
use repset_events::EventEnvelope;

use crate::projections::cursor::{CursorDecision, StreamCursors};
use crate::read_model::TenantStore;

/// One recorded transaction within a day view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEntry {
    pub entry_id: Uuid,
    pub entry: TransactionEntry,
}

/// Read model for one tenant-day of the cash ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyCashView {
    pub daily_cash_id: DailyCashId,
    pub date: NaiveDate,
    pub status: DailyCashStatus,
    pub opening_amount: i64,
    pub total_income: i64,
    pub total_expense: i64,
    pub transactions: Vec<RecordedEntry>,
    pub closing_amount: Option<i64>,
    pub expected_amount: Option<i64>,
    pub discrepancy: Option<i64>,
}

impl DailyCashView {
    /// Running balance: opening plus income minus expense.
    pub fn current_balance(&self) -> i64 {
        self.opening_amount + self.total_income - self.total_expense
    }
}

#[derive(Debug, Error)]
pub enum DailyCashProjectionError {
    #[error("failed to deserialize cashbook event: {0}")]
    Deserialize(String),

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Daily cash projection.
///
/// Keyed by calendar date within a tenant, which is how the front desk asks
/// for it ("today's ledger"), with range queries feeding period summaries.
#[derive(Debug)]
pub struct DailyCashViewProjection<S>
where
    S: TenantStore<NaiveDate, DailyCashView>,
{
    store: S,
    cursors: StreamCursors,
}

impl<S> DailyCashViewProjection<S>
where
    S: TenantStore<NaiveDate, DailyCashView>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get_day(&self, tenant_id: TenantId, date: NaiveDate) -> Option<DailyCashView> {
        self.store.get(tenant_id, &date)
    }

    /// Day views within `[from, to]`, ordered by date.
    pub fn range(&self, tenant_id: TenantId, from: NaiveDate, to: NaiveDate) -> Vec<DailyCashView> {
        let mut days: Vec<_> = self
            .store
            .list(tenant_id)
            .into_iter()
            .filter(|view| view.date >= from && view.date <= to)
            .collect();
        days.sort_by_key(|view| view.date);
        days
    }

    /// Aggregate income/expense over a date range, broken down by category.
    pub fn summarize_range(
        &self,
        tenant_id: TenantId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> RangeSummary {
        let days = self.range(tenant_id, from, to);
        summarize(days.iter().flat_map(|d| d.transactions.iter().map(|r| &r.entry)))
    }

    /// Apply a published envelope into the projection.
    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), DailyCashProjectionError> {
        if envelope.aggregate_type() != "cashbook.daily_cash" {
            return Ok(());
        }

        let tenant_id = envelope.tenant_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        match self.cursors.check(tenant_id, aggregate_id, seq) {
            CursorDecision::Duplicate => return Ok(()),
            CursorDecision::OutOfOrder { last } => {
                return Err(DailyCashProjectionError::NonMonotonicSequence { last, found: seq });
            }
            CursorDecision::Apply => {}
        }

        let event: DailyCashEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| DailyCashProjectionError::Deserialize(e.to_string()))?;

        let (event_tenant, daily_cash_id) = match &event {
            DailyCashEvent::DailyCashOpened(e) => (e.tenant_id, e.daily_cash_id),
            DailyCashEvent::TransactionRecorded(e) => (e.tenant_id, e.daily_cash_id),
            DailyCashEvent::DailyCashClosed(e) => (e.tenant_id, e.daily_cash_id),
        };

        if event_tenant != tenant_id {
            return Err(DailyCashProjectionError::TenantIsolation(
                "event tenant_id does not match envelope tenant_id".to_string(),
            ));
        }

        if daily_cash_id.0 != aggregate_id {
            return Err(DailyCashProjectionError::TenantIsolation(
                "event daily_cash_id does not match envelope aggregate_id".to_string(),
            ));
        }

        match event {
            DailyCashEvent::DailyCashOpened(e) => {
                self.store.upsert(
                    tenant_id,
                    e.date,
                    DailyCashView {
                        daily_cash_id: e.daily_cash_id,
                        date: e.date,
                        status: DailyCashStatus::Open,
                        opening_amount: e.opening_amount,
                        total_income: 0,
                        total_expense: 0,
                        transactions: Vec::new(),
                        closing_amount: None,
                        expected_amount: None,
                        discrepancy: None,
                    },
                );
            }
            DailyCashEvent::TransactionRecorded(e) => {
                if let Some(mut view) = self.find_by_id(tenant_id, e.daily_cash_id) {
                    match e.entry.kind {
                        TransactionKind::Income => view.total_income += e.entry.amount,
                        TransactionKind::Expense => view.total_expense += e.entry.amount,
                    }
                    view.transactions.push(RecordedEntry {
                        entry_id: e.entry_id,
                        entry: e.entry,
                    });
                    self.store.upsert(tenant_id, view.date, view);
                }
            }
            DailyCashEvent::DailyCashClosed(e) => {
                if let Some(mut view) = self.find_by_id(tenant_id, e.daily_cash_id) {
                    view.status = DailyCashStatus::Closed;
                    view.closing_amount = Some(e.closing_amount);
                    view.expected_amount = Some(e.expected_amount);
                    view.discrepancy = Some(e.discrepancy);
                    self.store.upsert(tenant_id, view.date, view);
                }
            }
        }

        self.cursors.advance(tenant_id, aggregate_id, seq);
        Ok(())
    }

    fn find_by_id(&self, tenant_id: TenantId, daily_cash_id: DailyCashId) -> Option<DailyCashView> {
        self.store
            .list(tenant_id)
            .into_iter()
            .find(|view| view.daily_cash_id == daily_cash_id)
    }

    /// Rebuild the read model from scratch by replaying envelopes.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), DailyCashProjectionError> {
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
