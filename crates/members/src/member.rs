use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use repset_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use repset_events::Event;

/// Member identifier (tenant-scoped via `tenant_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberId(pub AggregateId);

impl MemberId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for MemberId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Member status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberStatus {
    Active,
    Inactive,
}

/// Contact information for a member.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

/// Aggregate root: gym member.
///
/// `total_debt` is tracked in integer cents and never drops below zero:
/// a settlement larger than the outstanding balance is rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    id: MemberId,
    tenant_id: Option<TenantId>,
    first_name: String,
    last_name: String,
    contact: ContactInfo,
    status: MemberStatus,
    total_debt: i64,
    version: u64,
    created: bool,
}

impl Member {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: MemberId) -> Self {
        Self {
            id,
            tenant_id: None,
            first_name: String::new(),
            last_name: String::new(),
            contact: ContactInfo::default(),
            status: MemberStatus::Active,
            total_debt: 0,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> MemberId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn first_name(&self) -> &str {
        &self.first_name
    }

    pub fn last_name(&self) -> &str {
        &self.last_name
    }

    pub fn contact(&self) -> &ContactInfo {
        &self.contact
    }

    pub fn status(&self) -> MemberStatus {
        self.status
    }

    /// Outstanding debt in cents. Always >= 0.
    pub fn total_debt(&self) -> i64 {
        self.total_debt
    }

    /// Invariant helper: whether this member may check in at the door.
    ///
    /// Inactive members cannot check in.
    pub fn can_check_in(&self) -> bool {
        self.status == MemberStatus::Active
    }
}

impl AggregateRoot for Member {
    type Id = MemberId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterMember.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterMember {
    pub tenant_id: TenantId,
    pub member_id: MemberId,
    pub first_name: String,
    pub last_name: String,
    pub contact: Option<ContactInfo>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateDetails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateDetails {
    pub tenant_id: TenantId,
    pub member_id: MemberId,
    /// Optional new first name (if None, keep existing).
    pub first_name: Option<String>,
    /// Optional new last name (if None, keep existing).
    pub last_name: Option<String>,
    /// Optional new contact info (if None, keep existing).
    pub contact: Option<ContactInfo>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeactivateMember.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeactivateMember {
    pub tenant_id: TenantId,
    pub member_id: MemberId,
    /// Optional human-readable reason for deactivation.
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReactivateMember.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactivateMember {
    pub tenant_id: TenantId,
    pub member_id: MemberId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AccrueDebt. Amount in cents, must be positive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccrueDebt {
    pub tenant_id: TenantId,
    pub member_id: MemberId,
    pub amount: i64,
    /// What the debt is for (e.g. an unpaid plan assignment).
    pub description: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SettleDebt. Amount in cents, must be positive and at most
/// the outstanding balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettleDebt {
    pub tenant_id: TenantId,
    pub member_id: MemberId,
    pub amount: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemberCommand {
    RegisterMember(RegisterMember),
    UpdateDetails(UpdateDetails),
    DeactivateMember(DeactivateMember),
    ReactivateMember(ReactivateMember),
    AccrueDebt(AccrueDebt),
    SettleDebt(SettleDebt),
}

/// Event: MemberRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRegistered {
    pub tenant_id: TenantId,
    pub member_id: MemberId,
    pub first_name: String,
    pub last_name: String,
    pub contact: ContactInfo,
    pub occurred_at: DateTime<Utc>,
}

/// Event: MemberUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberUpdated {
    pub tenant_id: TenantId,
    pub member_id: MemberId,
    pub first_name: String,
    pub last_name: String,
    pub contact: ContactInfo,
    pub occurred_at: DateTime<Utc>,
}

/// Event: MemberDeactivated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberDeactivated {
    pub tenant_id: TenantId,
    pub member_id: MemberId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: MemberReactivated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberReactivated {
    pub tenant_id: TenantId,
    pub member_id: MemberId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: DebtAccrued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebtAccrued {
    pub tenant_id: TenantId,
    pub member_id: MemberId,
    pub amount: i64,
    pub description: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: DebtSettled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebtSettled {
    pub tenant_id: TenantId,
    pub member_id: MemberId,
    pub amount: i64,
    /// Balance remaining after this settlement.
    pub remaining_debt: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemberEvent {
    MemberRegistered(MemberRegistered),
    MemberUpdated(MemberUpdated),
    MemberDeactivated(MemberDeactivated),
    MemberReactivated(MemberReactivated),
    DebtAccrued(DebtAccrued),
    DebtSettled(DebtSettled),
}

impl Event for MemberEvent {
    fn event_type(&self) -> &'static str {
        match self {
            MemberEvent::MemberRegistered(_) => "members.member.registered",
            MemberEvent::MemberUpdated(_) => "members.member.updated",
            MemberEvent::MemberDeactivated(_) => "members.member.deactivated",
            MemberEvent::MemberReactivated(_) => "members.member.reactivated",
            MemberEvent::DebtAccrued(_) => "members.member.debt_accrued",
            MemberEvent::DebtSettled(_) => "members.member.debt_settled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            MemberEvent::MemberRegistered(e) => e.occurred_at,
            MemberEvent::MemberUpdated(e) => e.occurred_at,
            MemberEvent::MemberDeactivated(e) => e.occurred_at,
            MemberEvent::MemberReactivated(e) => e.occurred_at,
            MemberEvent::DebtAccrued(e) => e.occurred_at,
            MemberEvent::DebtSettled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Member {
    type Command = MemberCommand;
    type Event = MemberEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            MemberEvent::MemberRegistered(e) => {
                self.id = e.member_id;
                self.tenant_id = Some(e.tenant_id);
                self.first_name = e.first_name.clone();
                self.last_name = e.last_name.clone();
                self.contact = e.contact.clone();
                self.status = MemberStatus::Active;
                self.total_debt = 0;
                self.created = true;
            }
            MemberEvent::MemberUpdated(e) => {
                self.first_name = e.first_name.clone();
                self.last_name = e.last_name.clone();
                self.contact = e.contact.clone();
            }
            MemberEvent::MemberDeactivated(_) => {
                self.status = MemberStatus::Inactive;
            }
            MemberEvent::MemberReactivated(_) => {
                self.status = MemberStatus::Active;
            }
            MemberEvent::DebtAccrued(e) => {
                self.total_debt += e.amount;
            }
            MemberEvent::DebtSettled(e) => {
                self.total_debt -= e.amount;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            MemberCommand::RegisterMember(cmd) => self.handle_register(cmd),
            MemberCommand::UpdateDetails(cmd) => self.handle_update(cmd),
            MemberCommand::DeactivateMember(cmd) => self.handle_deactivate(cmd),
            MemberCommand::ReactivateMember(cmd) => self.handle_reactivate(cmd),
            MemberCommand::AccrueDebt(cmd) => self.handle_accrue_debt(cmd),
            MemberCommand::SettleDebt(cmd) => self.handle_settle_debt(cmd),
        }
    }
}

impl Member {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn ensure_member_id(&self, member_id: MemberId) -> Result<(), DomainError> {
        if self.id != member_id {
            return Err(DomainError::invariant("member_id mismatch"));
        }
        Ok(())
    }

    fn ensure_created(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        Ok(())
    }

    fn handle_register(&self, cmd: &RegisterMember) -> Result<Vec<MemberEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("member already exists"));
        }

        if cmd.first_name.trim().is_empty() || cmd.last_name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }

        let contact = cmd.contact.clone().unwrap_or_default();

        Ok(vec![MemberEvent::MemberRegistered(MemberRegistered {
            tenant_id: cmd.tenant_id,
            member_id: cmd.member_id,
            first_name: cmd.first_name.clone(),
            last_name: cmd.last_name.clone(),
            contact,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateDetails) -> Result<Vec<MemberEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_member_id(cmd.member_id)?;

        let first_name = cmd
            .first_name
            .clone()
            .unwrap_or_else(|| self.first_name.clone());
        let last_name = cmd
            .last_name
            .clone()
            .unwrap_or_else(|| self.last_name.clone());
        if first_name.trim().is_empty() || last_name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }

        let contact = cmd.contact.clone().unwrap_or_else(|| self.contact.clone());

        Ok(vec![MemberEvent::MemberUpdated(MemberUpdated {
            tenant_id: cmd.tenant_id,
            member_id: cmd.member_id,
            first_name,
            last_name,
            contact,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_deactivate(&self, cmd: &DeactivateMember) -> Result<Vec<MemberEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_member_id(cmd.member_id)?;

        if self.status == MemberStatus::Inactive {
            return Err(DomainError::conflict("member is already inactive"));
        }

        Ok(vec![MemberEvent::MemberDeactivated(MemberDeactivated {
            tenant_id: cmd.tenant_id,
            member_id: cmd.member_id,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reactivate(&self, cmd: &ReactivateMember) -> Result<Vec<MemberEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_member_id(cmd.member_id)?;

        if self.status == MemberStatus::Active {
            return Err(DomainError::conflict("member is already active"));
        }

        Ok(vec![MemberEvent::MemberReactivated(MemberReactivated {
            tenant_id: cmd.tenant_id,
            member_id: cmd.member_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_accrue_debt(&self, cmd: &AccrueDebt) -> Result<Vec<MemberEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_member_id(cmd.member_id)?;

        if cmd.amount <= 0 {
            return Err(DomainError::validation("debt amount must be positive"));
        }

        Ok(vec![MemberEvent::DebtAccrued(DebtAccrued {
            tenant_id: cmd.tenant_id,
            member_id: cmd.member_id,
            amount: cmd.amount,
            description: cmd.description.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_settle_debt(&self, cmd: &SettleDebt) -> Result<Vec<MemberEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_member_id(cmd.member_id)?;

        if cmd.amount <= 0 {
            return Err(DomainError::validation("settlement amount must be positive"));
        }
        if cmd.amount > self.total_debt {
            return Err(DomainError::validation(
                "settlement exceeds outstanding debt",
            ));
        }

        Ok(vec![MemberEvent::DebtSettled(DebtSettled {
            tenant_id: cmd.tenant_id,
            member_id: cmd.member_id,
            amount: cmd.amount,
            remaining_debt: self.total_debt - cmd.amount,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use repset_core::AggregateId;

    fn test_tenant_id() -> TenantId {
        TenantId::new()
    }

    fn test_member_id() -> MemberId {
        MemberId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn registered_member(tenant_id: TenantId, member_id: MemberId) -> Member {
        let mut member = Member::empty(member_id);
        let cmd = RegisterMember {
            tenant_id,
            member_id,
            first_name: "Ana".to_string(),
            last_name: "Lopez".to_string(),
            contact: None,
            occurred_at: test_time(),
        };
        let events = member.handle(&MemberCommand::RegisterMember(cmd)).unwrap();
        member.apply(&events[0]);
        member
    }

    #[test]
    fn register_member_emits_member_registered_event() {
        let member = Member::empty(test_member_id());
        let tenant_id = test_tenant_id();
        let member_id = test_member_id();
        let contact = ContactInfo {
            email: Some("ana@example.com".to_string()),
            phone: Some("+541123456789".to_string()),
            address: Some("Av. Corrientes 1234".to_string()),
        };
        let cmd = RegisterMember {
            tenant_id,
            member_id,
            first_name: "Ana".to_string(),
            last_name: "Lopez".to_string(),
            contact: Some(contact.clone()),
            occurred_at: test_time(),
        };

        let events = member
            .handle(&MemberCommand::RegisterMember(cmd.clone()))
            .unwrap();
        assert_eq!(events.len(), 1);

        match &events[0] {
            MemberEvent::MemberRegistered(e) => {
                assert_eq!(e.tenant_id, tenant_id);
                assert_eq!(e.member_id, member_id);
                assert_eq!(e.first_name, "Ana");
                assert_eq!(e.last_name, "Lopez");
                assert_eq!(e.contact, contact);
            }
            _ => panic!("Expected MemberRegistered event"),
        }
    }

    #[test]
    fn register_member_rejects_empty_name() {
        let member = Member::empty(test_member_id());
        let cmd = RegisterMember {
            tenant_id: test_tenant_id(),
            member_id: test_member_id(),
            first_name: "   ".to_string(),
            last_name: "Lopez".to_string(),
            contact: None,
            occurred_at: test_time(),
        };

        let err = member
            .handle(&MemberCommand::RegisterMember(cmd))
            .unwrap_err();
        match err {
            DomainError::Validation(_) => {}
            _ => panic!("Expected Validation error for empty name"),
        }
    }

    #[test]
    fn register_member_rejects_duplicate_creation() {
        let tenant_id = test_tenant_id();
        let member_id = test_member_id();
        let member = registered_member(tenant_id, member_id);

        let cmd = RegisterMember {
            tenant_id,
            member_id,
            first_name: "Ana".to_string(),
            last_name: "Lopez".to_string(),
            contact: None,
            occurred_at: test_time(),
        };
        let err = member
            .handle(&MemberCommand::RegisterMember(cmd))
            .unwrap_err();
        match err {
            DomainError::Conflict(_) => {}
            _ => panic!("Expected Conflict error for duplicate creation"),
        }
    }

    #[test]
    fn update_details_updates_names_and_contact() {
        let tenant_id = test_tenant_id();
        let member_id = test_member_id();
        let mut member = registered_member(tenant_id, member_id);

        let new_contact = ContactInfo {
            email: Some("new@example.com".to_string()),
            phone: None,
            address: None,
        };
        let cmd = UpdateDetails {
            tenant_id,
            member_id,
            first_name: Some("Anabel".to_string()),
            last_name: None,
            contact: Some(new_contact.clone()),
            occurred_at: test_time(),
        };

        let events = member.handle(&MemberCommand::UpdateDetails(cmd)).unwrap();
        assert_eq!(events.len(), 1);

        match &events[0] {
            MemberEvent::MemberUpdated(e) => {
                assert_eq!(e.first_name, "Anabel");
                // Last name is kept when the command leaves it unset.
                assert_eq!(e.last_name, "Lopez");
                assert_eq!(e.contact, new_contact);
            }
            _ => panic!("Expected MemberUpdated event"),
        }

        member.apply(&events[0]);
        assert_eq!(member.first_name(), "Anabel");
        assert_eq!(member.last_name(), "Lopez");
    }

    #[test]
    fn deactivate_member_blocks_check_in() {
        let tenant_id = test_tenant_id();
        let member_id = test_member_id();
        let mut member = registered_member(tenant_id, member_id);
        assert!(member.can_check_in());

        let cmd = DeactivateMember {
            tenant_id,
            member_id,
            reason: Some("Unpaid plan".to_string()),
            occurred_at: test_time(),
        };
        let events = member
            .handle(&MemberCommand::DeactivateMember(cmd))
            .unwrap();
        assert_eq!(events.len(), 1);

        match &events[0] {
            MemberEvent::MemberDeactivated(e) => {
                assert_eq!(e.tenant_id, tenant_id);
                assert_eq!(e.member_id, member_id);
                assert_eq!(e.reason.as_deref(), Some("Unpaid plan"));
            }
            _ => panic!("Expected MemberDeactivated event"),
        }

        member.apply(&events[0]);
        assert_eq!(member.status(), MemberStatus::Inactive);
        assert!(!member.can_check_in());
    }

    #[test]
    fn deactivate_member_rejects_already_inactive() {
        let tenant_id = test_tenant_id();
        let member_id = test_member_id();
        let mut member = registered_member(tenant_id, member_id);

        let cmd = DeactivateMember {
            tenant_id,
            member_id,
            reason: None,
            occurred_at: test_time(),
        };
        let events = member
            .handle(&MemberCommand::DeactivateMember(cmd.clone()))
            .unwrap();
        member.apply(&events[0]);

        let err = member
            .handle(&MemberCommand::DeactivateMember(cmd))
            .unwrap_err();
        match err {
            DomainError::Conflict(_) => {}
            _ => panic!("Expected Conflict error for already inactive member"),
        }
    }

    #[test]
    fn reactivate_member_restores_check_in() {
        let tenant_id = test_tenant_id();
        let member_id = test_member_id();
        let mut member = registered_member(tenant_id, member_id);

        let deactivate = DeactivateMember {
            tenant_id,
            member_id,
            reason: None,
            occurred_at: test_time(),
        };
        let events = member
            .handle(&MemberCommand::DeactivateMember(deactivate))
            .unwrap();
        member.apply(&events[0]);
        assert!(!member.can_check_in());

        let reactivate = ReactivateMember {
            tenant_id,
            member_id,
            occurred_at: test_time(),
        };
        let events = member
            .handle(&MemberCommand::ReactivateMember(reactivate))
            .unwrap();
        member.apply(&events[0]);
        assert_eq!(member.status(), MemberStatus::Active);
        assert!(member.can_check_in());
    }

    #[test]
    fn deactivate_rejects_non_existent_member() {
        let member = Member::empty(test_member_id());
        let cmd = DeactivateMember {
            tenant_id: test_tenant_id(),
            member_id: test_member_id(),
            reason: None,
            occurred_at: test_time(),
        };

        let err = member
            .handle(&MemberCommand::DeactivateMember(cmd))
            .unwrap_err();
        match err {
            DomainError::NotFound => {}
            _ => panic!("Expected NotFound error for non-existent member"),
        }
    }

    #[test]
    fn accrue_debt_increases_balance() {
        let tenant_id = test_tenant_id();
        let member_id = test_member_id();
        let mut member = registered_member(tenant_id, member_id);
        assert_eq!(member.total_debt(), 0);

        let cmd = AccrueDebt {
            tenant_id,
            member_id,
            amount: 25_000,
            description: "Monthly plan, payment pending".to_string(),
            occurred_at: test_time(),
        };
        let events = member.handle(&MemberCommand::AccrueDebt(cmd)).unwrap();
        assert_eq!(events.len(), 1);

        match &events[0] {
            MemberEvent::DebtAccrued(e) => {
                assert_eq!(e.amount, 25_000);
                assert_eq!(e.description, "Monthly plan, payment pending");
            }
            _ => panic!("Expected DebtAccrued event"),
        }

        member.apply(&events[0]);
        assert_eq!(member.total_debt(), 25_000);
    }

    #[test]
    fn accrue_debt_rejects_non_positive_amount() {
        let tenant_id = test_tenant_id();
        let member_id = test_member_id();
        let member = registered_member(tenant_id, member_id);

        for amount in [0, -500] {
            let cmd = AccrueDebt {
                tenant_id,
                member_id,
                amount,
                description: "bad".to_string(),
                occurred_at: test_time(),
            };
            let err = member.handle(&MemberCommand::AccrueDebt(cmd)).unwrap_err();
            match err {
                DomainError::Validation(_) => {}
                _ => panic!("Expected Validation error for amount {amount}"),
            }
        }
    }

    #[test]
    fn settle_debt_reduces_balance_and_reports_remainder() {
        let tenant_id = test_tenant_id();
        let member_id = test_member_id();
        let mut member = registered_member(tenant_id, member_id);

        let accrue = AccrueDebt {
            tenant_id,
            member_id,
            amount: 30_000,
            description: "plan".to_string(),
            occurred_at: test_time(),
        };
        let events = member.handle(&MemberCommand::AccrueDebt(accrue)).unwrap();
        member.apply(&events[0]);

        let settle = SettleDebt {
            tenant_id,
            member_id,
            amount: 10_000,
            occurred_at: test_time(),
        };
        let events = member.handle(&MemberCommand::SettleDebt(settle)).unwrap();
        assert_eq!(events.len(), 1);

        match &events[0] {
            MemberEvent::DebtSettled(e) => {
                assert_eq!(e.amount, 10_000);
                assert_eq!(e.remaining_debt, 20_000);
            }
            _ => panic!("Expected DebtSettled event"),
        }

        member.apply(&events[0]);
        assert_eq!(member.total_debt(), 20_000);
    }

    #[test]
    fn settle_debt_rejects_overpayment() {
        let tenant_id = test_tenant_id();
        let member_id = test_member_id();
        let mut member = registered_member(tenant_id, member_id);

        let accrue = AccrueDebt {
            tenant_id,
            member_id,
            amount: 5_000,
            description: "plan".to_string(),
            occurred_at: test_time(),
        };
        let events = member.handle(&MemberCommand::AccrueDebt(accrue)).unwrap();
        member.apply(&events[0]);

        let settle = SettleDebt {
            tenant_id,
            member_id,
            amount: 5_001,
            occurred_at: test_time(),
        };
        let err = member.handle(&MemberCommand::SettleDebt(settle)).unwrap_err();
        match err {
            DomainError::Validation(_) => {}
            _ => panic!("Expected Validation error for overpayment"),
        }
        // Debt floor holds: balance unchanged.
        assert_eq!(member.total_debt(), 5_000);
    }

    #[test]
    fn version_increments_on_apply() {
        let tenant_id = test_tenant_id();
        let member_id = test_member_id();
        let mut member = Member::empty(member_id);
        assert_eq!(member.version(), 0);

        let register = RegisterMember {
            tenant_id,
            member_id,
            first_name: "Ana".to_string(),
            last_name: "Lopez".to_string(),
            contact: None,
            occurred_at: test_time(),
        };
        let events = member
            .handle(&MemberCommand::RegisterMember(register))
            .unwrap();
        member.apply(&events[0]);
        assert_eq!(member.version(), 1);

        let accrue = AccrueDebt {
            tenant_id,
            member_id,
            amount: 1_000,
            description: "plan".to_string(),
            occurred_at: test_time(),
        };
        let events = member.handle(&MemberCommand::AccrueDebt(accrue)).unwrap();
        member.apply(&events[0]);
        assert_eq!(member.version(), 2);
    }

    #[test]
    fn handle_does_not_mutate_state() {
        let tenant_id = test_tenant_id();
        let member_id = test_member_id();
        let member = registered_member(tenant_id, member_id);
        let initial_version = member.version();
        let initial_status = member.status();

        let cmd = DeactivateMember {
            tenant_id,
            member_id,
            reason: Some("Reason".to_string()),
            occurred_at: test_time(),
        };

        let events1 = member
            .handle(&MemberCommand::DeactivateMember(cmd.clone()))
            .unwrap();
        let events2 = member
            .handle(&MemberCommand::DeactivateMember(cmd))
            .unwrap();

        assert_eq!(member.version(), initial_version);
        assert_eq!(member.status(), initial_status);
        assert_eq!(events1, events2);
    }

    #[test]
    fn apply_is_deterministic() {
        let tenant_id = test_tenant_id();
        let member_id = test_member_id();
        let event1 = MemberEvent::MemberRegistered(MemberRegistered {
            tenant_id,
            member_id,
            first_name: "Ana".to_string(),
            last_name: "Lopez".to_string(),
            contact: ContactInfo::default(),
            occurred_at: test_time(),
        });
        let event2 = MemberEvent::DebtAccrued(DebtAccrued {
            tenant_id,
            member_id,
            amount: 7_500,
            description: "plan".to_string(),
            occurred_at: test_time(),
        });

        let mut member1 = Member::empty(member_id);
        member1.apply(&event1);
        member1.apply(&event2);

        let mut member2 = Member::empty(member_id);
        member2.apply(&event1);
        member2.apply(&event2);

        assert_eq!(member1, member2);
        assert_eq!(member1.version(), 2);
        assert_eq!(member1.total_debt(), 7_500);
    }
}
