use serde::{Deserialize, Serialize};

use evented_core::{AggregateId, AggregateState, Behavior, DomainError, ExpectedRevision};
use evented_events::{Command, Contract};

/// Aggregate state: Account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountState {
    id: AggregateId,
    version: u64,
    email: Option<String>,
    email_changes: u32,
}

impl AccountState {
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    pub fn is_registered(&self) -> bool {
        self.email.is_some()
    }

    pub fn email_changes(&self) -> u32 {
        self.email_changes
    }
}

impl AggregateState for AccountState {
    type Event = AccountEvent;

    fn initial(id: AggregateId) -> Self {
        Self {
            id,
            version: 0,
            email: None,
            email_changes: 0,
        }
    }

    fn id(&self) -> AggregateId {
        self.id
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn set_version(&mut self, version: u64) {
        self.version = version;
    }

    fn apply(&mut self, event: &AccountEvent) {
        match event {
            AccountEvent::Registered(e) => {
                self.email = Some(e.email.clone());
            }
            AccountEvent::EmailChanged(e) => {
                self.email = Some(e.new_email.clone());
                self.email_changes += 1;
            }
        }
    }
}

/// Command: RegisterAccount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterAccount {
    pub account_id: AggregateId,
    pub email: String,
    #[serde(default)]
    pub expected_revision: ExpectedRevision,
}

/// Command: ChangeEmail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEmail {
    pub account_id: AggregateId,
    pub new_email: String,
    #[serde(default)]
    pub expected_revision: ExpectedRevision,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountCommand {
    Register(RegisterAccount),
    ChangeEmail(ChangeEmail),
}

impl AccountCommand {
    pub fn register(account_id: AggregateId, email: impl Into<String>) -> Self {
        Self::Register(RegisterAccount {
            account_id,
            email: email.into(),
            expected_revision: ExpectedRevision::Unset,
        })
    }

    pub fn change_email(account_id: AggregateId, new_email: impl Into<String>) -> Self {
        Self::ChangeEmail(ChangeEmail {
            account_id,
            new_email: new_email.into(),
            expected_revision: ExpectedRevision::Unset,
        })
    }

    /// Pin the version this command expects to produce.
    pub fn expecting(mut self, revision: u64) -> Self {
        let expected = ExpectedRevision::Exact(revision);
        match &mut self {
            AccountCommand::Register(c) => c.expected_revision = expected,
            AccountCommand::ChangeEmail(c) => c.expected_revision = expected,
        }
        self
    }
}

impl Command for AccountCommand {
    fn target_aggregate_id(&self) -> AggregateId {
        match self {
            AccountCommand::Register(c) => c.account_id,
            AccountCommand::ChangeEmail(c) => c.account_id,
        }
    }

    fn expected_revision(&self) -> ExpectedRevision {
        match self {
            AccountCommand::Register(c) => c.expected_revision,
            AccountCommand::ChangeEmail(c) => c.expected_revision,
        }
    }
}

/// Event: AccountRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRegistered {
    pub account_id: AggregateId,
    pub email: String,
}

/// Event: AccountEmailChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountEmailChanged {
    pub account_id: AggregateId,
    pub old_email: String,
    pub new_email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountEvent {
    Registered(AccountRegistered),
    EmailChanged(AccountEmailChanged),
}

impl AccountEvent {
    pub const REGISTERED: &'static str = "accounts.account.registered";
    pub const EMAIL_CHANGED: &'static str = "accounts.account.email_changed";
}

impl Contract for AccountEvent {
    fn contract_name(&self) -> &'static str {
        match self {
            AccountEvent::Registered(_) => Self::REGISTERED,
            AccountEvent::EmailChanged(_) => Self::EMAIL_CHANGED,
        }
    }
}

impl Behavior for AccountState {
    type Command = AccountCommand;
    type Error = DomainError;

    fn handle(&self, command: &AccountCommand) -> Result<Vec<AccountEvent>, DomainError> {
        if command.target_aggregate_id() != self.id {
            return Err(DomainError::invariant("account_id mismatch"));
        }
        match command {
            AccountCommand::Register(cmd) => self.handle_register(cmd),
            AccountCommand::ChangeEmail(cmd) => self.handle_change_email(cmd),
        }
    }
}

impl AccountState {
    fn handle_register(&self, cmd: &RegisterAccount) -> Result<Vec<AccountEvent>, DomainError> {
        if self.is_registered() {
            return Err(DomainError::conflict("account already registered"));
        }
        validate_email(&cmd.email)?;
        Ok(vec![AccountEvent::Registered(AccountRegistered {
            account_id: cmd.account_id,
            email: cmd.email.trim().to_string(),
        })])
    }

    fn handle_change_email(&self, cmd: &ChangeEmail) -> Result<Vec<AccountEvent>, DomainError> {
        let Some(current) = self.email.as_deref() else {
            return Err(DomainError::not_found());
        };
        validate_email(&cmd.new_email)?;

        let new_email = cmd.new_email.trim();
        if new_email == current {
            // Nothing changes; an empty decision makes the save a no-op.
            return Ok(vec![]);
        }

        Ok(vec![AccountEvent::EmailChanged(AccountEmailChanged {
            account_id: cmd.account_id,
            old_email: current.to_string(),
            new_email: new_email.to_string(),
        })])
    }
}

fn validate_email(email: &str) -> Result<(), DomainError> {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
        _ => Err(DomainError::validation(format!("invalid email: {email:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use evented_core::AggregateRoot;
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn registers_once() {
        let id = AggregateId::new();
        let mut root = AggregateRoot::<AccountState>::new(id);

        root.execute(&AccountCommand::register(id, "ada@example.com"))
            .unwrap();
        assert_eq!(root.state().email(), Some("ada@example.com"));

        let err = root
            .execute(&AccountCommand::register(id, "ada@example.com"))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn change_email_requires_registration() {
        let id = AggregateId::new();
        let mut root = AggregateRoot::<AccountState>::new(id);
        let err = root
            .execute(&AccountCommand::change_email(id, "x@example.com"))
            .unwrap_err();
        assert_eq!(err, DomainError::NotFound);
    }

    #[test]
    fn unchanged_email_decides_nothing() {
        let id = AggregateId::new();
        let mut root = AggregateRoot::<AccountState>::new(id);
        root.execute(&AccountCommand::register(id, "a@example.com"))
            .unwrap();
        root.mark_committed(1);

        let raised = root
            .execute(&AccountCommand::change_email(id, " a@example.com "))
            .unwrap();
        assert_eq!(raised, 0);
        assert!(!root.has_uncommitted_events());
    }

    #[test]
    fn rejects_commands_for_other_accounts() {
        let root = AggregateRoot::<AccountState>::new(AggregateId::new());
        let err = root
            .state()
            .handle(&AccountCommand::register(AggregateId::new(), "a@example.com"))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn expecting_pins_the_revision() {
        let id = AggregateId::new();
        let cmd = AccountCommand::change_email(id, "b@example.com").expecting(4);
        assert_eq!(cmd.expected_revision(), ExpectedRevision::Exact(4));
        assert_eq!(cmd.target_aggregate_id(), id);
    }

    proptest! {
        #[test]
        fn replaying_raised_events_rebuilds_the_same_state(
            locals in proptest::collection::vec("[a-z]{1,8}", 1..10)
        ) {
            let id = AggregateId::new();
            let mut live = AggregateRoot::<AccountState>::new(id);
            live.execute(&AccountCommand::register(id, "first@example.com")).unwrap();
            for local in &locals {
                live.execute(&AccountCommand::change_email(id, format!("{local}@example.org"))).unwrap();
            }

            let mut replayed = AggregateRoot::<AccountState>::new(id);
            replayed.replay(0, live.uncommitted_events());

            prop_assert_eq!(replayed.state(), live.state());
        }
    }
}
