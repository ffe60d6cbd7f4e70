use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use repset_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use repset_events::Event;

use crate::transaction::{Actor, TransactionCategory, TransactionEntry, TransactionKind};

/// Namespace for date-keyed cash ledger stream ids.
const DAY_STREAM_NAMESPACE: Uuid = uuid::uuid!("8f2f1db0-04a6-4f8e-9f34-5b2c6a1d9e47");

/// Deterministic stream id for a tenant's ledger on a given day.
///
/// Concurrent first access from any number of cashiers converges on the same
/// stream, so "open if absent" needs no coordination beyond the stream's
/// expected version.
pub fn day_stream_id(tenant_id: TenantId, date: NaiveDate) -> DailyCashId {
    let name = format!("{}:{}", tenant_id, date.format("%Y-%m-%d"));
    DailyCashId(AggregateId::from_uuid(Uuid::new_v5(
        &DAY_STREAM_NAMESPACE,
        name.as_bytes(),
    )))
}

/// Daily cash ledger identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DailyCashId(pub AggregateId);

impl DailyCashId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for DailyCashId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Ledger lifecycle. Closing is one-way; a closed day stays closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DailyCashStatus {
    Open,
    Closed,
}

/// Aggregate root: one gym's cash ledger for one calendar day.
///
/// Totals are maintained incrementally in `apply`; the balance is always
/// derived (`opening_amount + total_income - total_expense`), never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyCash {
    id: DailyCashId,
    tenant_id: Option<TenantId>,
    date: NaiveDate,
    opened_at: Option<DateTime<Utc>>,
    opening_amount: i64,
    opened_by: Option<Actor>,
    total_income: i64,
    total_expense: i64,
    membership_income: i64,
    other_income: i64,
    status: DailyCashStatus,
    closed_at: Option<DateTime<Utc>>,
    closing_amount: Option<i64>,
    discrepancy: Option<i64>,
    version: u64,
    created: bool,
}

impl DailyCash {
    /// Empty aggregate for rehydration.
    pub fn empty(id: DailyCashId) -> Self {
        Self {
            id,
            tenant_id: None,
            date: NaiveDate::MIN,
            opened_at: None,
            opening_amount: 0,
            opened_by: None,
            total_income: 0,
            total_expense: 0,
            membership_income: 0,
            other_income: 0,
            status: DailyCashStatus::Open,
            closed_at: None,
            closing_amount: None,
            discrepancy: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> DailyCashId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn is_open(&self) -> bool {
        self.created && self.status == DailyCashStatus::Open
    }

    pub fn opening_amount(&self) -> i64 {
        self.opening_amount
    }

    pub fn total_income(&self) -> i64 {
        self.total_income
    }

    pub fn total_expense(&self) -> i64 {
        self.total_expense
    }

    pub fn membership_income(&self) -> i64 {
        self.membership_income
    }

    pub fn other_income(&self) -> i64 {
        self.other_income
    }

    pub fn status(&self) -> DailyCashStatus {
        self.status
    }

    pub fn closing_amount(&self) -> Option<i64> {
        self.closing_amount
    }

    pub fn discrepancy(&self) -> Option<i64> {
        self.discrepancy
    }

    /// Cash expected in the drawer right now.
    pub fn current_balance(&self) -> i64 {
        self.opening_amount + self.total_income - self.total_expense
    }
}

impl AggregateRoot for DailyCash {
    type Id = DailyCashId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: OpenDailyCash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenDailyCash {
    pub tenant_id: TenantId,
    pub daily_cash_id: DailyCashId,
    pub date: NaiveDate,
    /// Float the cashier starts the day with, in cents.
    pub opening_amount: i64,
    pub opened_by: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordTransaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordTransaction {
    pub tenant_id: TenantId,
    pub daily_cash_id: DailyCashId,
    pub entry_id: Uuid,
    pub entry: TransactionEntry,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CloseDailyCash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseDailyCash {
    pub tenant_id: TenantId,
    pub daily_cash_id: DailyCashId,
    /// Cash counted in the drawer, in cents.
    pub closing_amount: i64,
    pub closed_by: Actor,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DailyCashCommand {
    OpenDailyCash(OpenDailyCash),
    RecordTransaction(RecordTransaction),
    CloseDailyCash(CloseDailyCash),
}

/// Event: DailyCashOpened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyCashOpened {
    pub tenant_id: TenantId,
    pub daily_cash_id: DailyCashId,
    pub date: NaiveDate,
    pub opening_amount: i64,
    pub opened_by: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Event: TransactionRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecorded {
    pub tenant_id: TenantId,
    pub daily_cash_id: DailyCashId,
    pub entry_id: Uuid,
    pub entry: TransactionEntry,
    pub occurred_at: DateTime<Utc>,
}

/// Event: DailyCashClosed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyCashClosed {
    pub tenant_id: TenantId,
    pub daily_cash_id: DailyCashId,
    pub closing_amount: i64,
    /// Balance the ledger computed at close time.
    pub expected_amount: i64,
    /// `closing_amount - expected_amount`. Negative means the drawer is short.
    pub discrepancy: i64,
    pub closed_by: Actor,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DailyCashEvent {
    DailyCashOpened(DailyCashOpened),
    TransactionRecorded(TransactionRecorded),
    DailyCashClosed(DailyCashClosed),
}

impl Event for DailyCashEvent {
    fn event_type(&self) -> &'static str {
        match self {
            DailyCashEvent::DailyCashOpened(_) => "cashbook.daily_cash.opened",
            DailyCashEvent::TransactionRecorded(_) => "cashbook.daily_cash.transaction_recorded",
            DailyCashEvent::DailyCashClosed(_) => "cashbook.daily_cash.closed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            DailyCashEvent::DailyCashOpened(e) => e.occurred_at,
            DailyCashEvent::TransactionRecorded(e) => e.occurred_at,
            DailyCashEvent::DailyCashClosed(e) => e.occurred_at,
        }
    }
}

impl Aggregate for DailyCash {
    type Command = DailyCashCommand;
    type Event = DailyCashEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            DailyCashEvent::DailyCashOpened(e) => {
                self.id = e.daily_cash_id;
                self.tenant_id = Some(e.tenant_id);
                self.date = e.date;
                self.opened_at = Some(e.occurred_at);
                self.opening_amount = e.opening_amount;
                self.opened_by = Some(e.opened_by.clone());
                self.status = DailyCashStatus::Open;
                self.created = true;
            }
            DailyCashEvent::TransactionRecorded(e) => match e.entry.kind {
                TransactionKind::Income => {
                    self.total_income += e.entry.amount;
                    if e.entry.category == TransactionCategory::Membership {
                        self.membership_income += e.entry.amount;
                    } else {
                        self.other_income += e.entry.amount;
                    }
                }
                TransactionKind::Expense => {
                    self.total_expense += e.entry.amount;
                }
            },
            DailyCashEvent::DailyCashClosed(e) => {
                self.status = DailyCashStatus::Closed;
                self.closed_at = Some(e.occurred_at);
                self.closing_amount = Some(e.closing_amount);
                self.discrepancy = Some(e.discrepancy);
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            DailyCashCommand::OpenDailyCash(cmd) => self.handle_open(cmd),
            DailyCashCommand::RecordTransaction(cmd) => self.handle_record(cmd),
            DailyCashCommand::CloseDailyCash(cmd) => self.handle_close(cmd),
        }
    }
}

impl DailyCash {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn ensure_daily_cash_id(&self, daily_cash_id: DailyCashId) -> Result<(), DomainError> {
        if self.id != daily_cash_id {
            return Err(DomainError::invariant("daily_cash_id mismatch"));
        }
        Ok(())
    }

    fn ensure_created(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        Ok(())
    }

    fn handle_open(&self, cmd: &OpenDailyCash) -> Result<Vec<DailyCashEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("cash ledger already open"));
        }
        if cmd.opening_amount < 0 {
            return Err(DomainError::validation("opening amount cannot be negative"));
        }

        Ok(vec![DailyCashEvent::DailyCashOpened(DailyCashOpened {
            tenant_id: cmd.tenant_id,
            daily_cash_id: cmd.daily_cash_id,
            date: cmd.date,
            opening_amount: cmd.opening_amount,
            opened_by: cmd.opened_by.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_record(&self, cmd: &RecordTransaction) -> Result<Vec<DailyCashEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_daily_cash_id(cmd.daily_cash_id)?;

        if self.status == DailyCashStatus::Closed {
            return Err(DomainError::conflict("cash ledger is closed"));
        }
        cmd.entry.validate()?;

        Ok(vec![DailyCashEvent::TransactionRecorded(
            TransactionRecorded {
                tenant_id: cmd.tenant_id,
                daily_cash_id: cmd.daily_cash_id,
                entry_id: cmd.entry_id,
                entry: cmd.entry.clone(),
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_close(&self, cmd: &CloseDailyCash) -> Result<Vec<DailyCashEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_daily_cash_id(cmd.daily_cash_id)?;

        if self.status == DailyCashStatus::Closed {
            return Err(DomainError::conflict("cash ledger is already closed"));
        }
        if cmd.closing_amount < 0 {
            return Err(DomainError::validation("closing amount cannot be negative"));
        }

        // Record the computed balance alongside the operator count instead of
        // trusting the operator input.
        let expected_amount = self.current_balance();
        let discrepancy = cmd.closing_amount - expected_amount;

        Ok(vec![DailyCashEvent::DailyCashClosed(DailyCashClosed {
            tenant_id: cmd.tenant_id,
            daily_cash_id: cmd.daily_cash_id,
            closing_amount: cmd.closing_amount,
            expected_amount,
            discrepancy,
            closed_by: cmd.closed_by.clone(),
            notes: cmd.notes.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}
