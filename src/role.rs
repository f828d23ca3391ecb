//! Role-set authorization for lifecycle transitions
use super::contract::Contract;
use super::error::{EngineError, EngineResult};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Role {
    Engineer,
    Contractor,
    Employer,
    ProjectArchitect,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Engineer => "engineer",
            Role::Contractor => "contractor",
            Role::Employer => "employer",
            Role::ProjectArchitect => "project_architect",
        }
    }
}

/// The calling user. Roles are not mutually exclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: String,
    pub roles: BTreeSet<Role>,
}

impl Principal {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            roles: BTreeSet::new(),
        }
    }
    pub fn with_role(mut self, role: Role) -> Self {
        self.roles.insert(role);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    RegisterContract,
    ChangeContractStatus,
    SubmitClaimNotice,
    AcknowledgeClaimNotice,
    SubmitDetailedClaim,
    BeginClaimReview,
    DetermineClaim,
    WithdrawClaim,
    SubmitDocument,
    BeginDocumentReview,
    ReviewDocument,
    RaiseDisagreement,
    DiscussDisagreement,
    DetermineDisagreement,
    ReferToDab,
    ResolveDisagreement,
    ReconcileDeadlines,
}

impl Action {
    /// Roles of which the actor must hold at least one. Empty means any principal.
    pub fn required_roles(&self) -> &'static [Role] {
        use Role::*;
        match self {
            Action::RegisterContract | Action::ChangeContractStatus => &[Engineer, Employer],
            Action::AcknowledgeClaimNotice
            | Action::BeginClaimReview
            | Action::DetermineClaim
            | Action::DetermineDisagreement => &[Engineer],
            Action::BeginDocumentReview | Action::ReviewDocument => &[Engineer, ProjectArchitect],
            Action::SubmitClaimNotice
            | Action::SubmitDetailedClaim
            | Action::WithdrawClaim
            | Action::SubmitDocument
            | Action::RaiseDisagreement
            | Action::DiscussDisagreement
            | Action::ReferToDab
            | Action::ResolveDisagreement
            | Action::ReconcileDeadlines => &[],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::RegisterContract => "register contract",
            Action::ChangeContractStatus => "change contract status",
            Action::SubmitClaimNotice => "submit claim notice",
            Action::AcknowledgeClaimNotice => "acknowledge claim notice",
            Action::SubmitDetailedClaim => "submit detailed claim",
            Action::BeginClaimReview => "begin claim review",
            Action::DetermineClaim => "determine claim",
            Action::WithdrawClaim => "withdraw claim",
            Action::SubmitDocument => "submit document",
            Action::BeginDocumentReview => "begin document review",
            Action::ReviewDocument => "review document",
            Action::RaiseDisagreement => "raise disagreement",
            Action::DiscussDisagreement => "discuss disagreement",
            Action::DetermineDisagreement => "determine disagreement",
            Action::ReferToDab => "refer disagreement to DAB",
            Action::ResolveDisagreement => "resolve disagreement",
            Action::ReconcileDeadlines => "reconcile deadlines",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn has_role(principal: &Principal, role: Role) -> bool {
    principal.roles.contains(&role)
}

/// Global role floor: the principal must hold one of `required_roles`.
pub fn authorize(principal: &Principal, action: Action, required_roles: &[Role]) -> EngineResult<()> {
    if required_roles.is_empty() || required_roles.iter().any(|r| has_role(principal, *r)) {
        return Ok(());
    }
    Err(EngineError::Authorization {
        action,
        required: required_roles.to_vec(),
    })
}

/// Shorthand for [`authorize`] with the action's own role requirement.
pub fn authorize_action(principal: &Principal, action: Action) -> EngineResult<()> {
    authorize(principal, action, action.required_roles())
}

/// Per-contract narrowing applied on top of the global role floor.
pub trait ContractScope: Send + Sync {
    fn check(&self, principal: &Principal, action: Action, contract: &Contract) -> EngineResult<()>;
}

/// No narrowing: any engineer may act on any contract.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unscoped;

impl ContractScope for Unscoped {
    fn check(&self, _: &Principal, _: Action, _: &Contract) -> EngineResult<()> {
        Ok(())
    }
}

/// Engineer-only actions must come from the engineer assigned on the contract,
/// when one is assigned.
#[derive(Debug, Default, Clone, Copy)]
pub struct AssignedEngineer;

impl ContractScope for AssignedEngineer {
    fn check(&self, principal: &Principal, action: Action, contract: &Contract) -> EngineResult<()> {
        let engineer_only = action.required_roles() == [Role::Engineer];
        match &contract.engineer_id {
            Some(assigned) if engineer_only && *assigned != principal.user_id => {
                Err(EngineError::Authorization {
                    action,
                    required: vec![Role::Engineer],
                })
            }
            _ => Ok(()),
        }
    }
}
