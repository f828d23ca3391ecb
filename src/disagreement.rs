//! Clause 3.7 agreement or determination
use super::deadline::{self, AGREEMENT_PERIOD_DAYS, TimeStamp};
use super::error::{EngineError, EngineResult, ValidationError};
use super::role::{Action, Principal, authorize_action};

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisagreementStatus {
    #[n(0)]
    Open,
    #[n(1)]
    UnderDiscussion,
    #[n(2)]
    AgreementReached,
    #[n(3)]
    DeterminationPending,
    #[n(4)]
    DeterminationIssued,
    #[n(5)]
    Resolved,
    #[n(6)]
    ReferredToDab,
}

impl DisagreementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisagreementStatus::Open => "open",
            DisagreementStatus::UnderDiscussion => "under_discussion",
            DisagreementStatus::AgreementReached => "agreement_reached",
            DisagreementStatus::DeterminationPending => "determination_pending",
            DisagreementStatus::DeterminationIssued => "determination_issued",
            DisagreementStatus::Resolved => "resolved",
            DisagreementStatus::ReferredToDab => "referred_to_dab",
        }
    }
}

impl std::fmt::Display for DisagreementStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

const CLOCK_STOPPED: [DisagreementStatus; 4] = [
    DisagreementStatus::AgreementReached,
    DisagreementStatus::DeterminationIssued,
    DisagreementStatus::Resolved,
    DisagreementStatus::ReferredToDab,
];

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Disagreement {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub contract_id: String,
    #[n(2)]
    pub claim_id: Option<String>,
    #[n(3)]
    pub reference_number: String,
    #[n(4)]
    pub subject: String,
    #[n(5)]
    pub description: Option<String>,
    #[n(6)]
    pub raised_by: String,
    #[n(7)]
    pub raised_at: TimeStamp,
    #[n(8)]
    pub agreement_deadline: TimeStamp,
    #[n(9)]
    pub status: DisagreementStatus,
    #[n(10)]
    pub engineer_determination: Option<String>,
    #[n(11)]
    pub determination_date: Option<TimeStamp>,
    #[n(12)]
    pub resolution_summary: Option<String>,
}

/// Input to raising a disagreement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisagreementDraft {
    pub contract_id: String,
    pub reference_number: String,
    pub subject: String,
    pub description: Option<String>,
    pub claim_id: Option<String>,
}

impl DisagreementDraft {
    pub fn new(contract_id: &str, reference_number: &str, subject: &str) -> Self {
        Self {
            contract_id: contract_id.to_string(),
            reference_number: reference_number.trim().to_string(),
            subject: subject.trim().to_string(),
            description: None,
            claim_id: None,
        }
    }
    pub fn set_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }
    pub fn set_claim(mut self, claim_id: &str) -> Self {
        self.claim_id = Some(claim_id.to_string());
        self
    }
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.contract_id.is_empty() {
            return Err(ValidationError::EmptyField("contract id"));
        }
        if self.reference_number.is_empty() {
            return Err(ValidationError::EmptyField("reference number"));
        }
        if self.subject.is_empty() {
            return Err(ValidationError::EmptyField("subject"));
        }
        Ok(())
    }
}

fn non_empty(text: &str, field: &'static str) -> Result<String, ValidationError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ValidationError::EmptyField(field));
    }
    Ok(text.to_string())
}

impl Disagreement {
    pub fn raise(id: String, draft: DisagreementDraft, actor: &Principal, now: TimeStamp) -> EngineResult<Self> {
        authorize_action(actor, Action::RaiseDisagreement)?;
        draft.validate()?;
        let agreement_deadline = deadline::add_days(now, AGREEMENT_PERIOD_DAYS)?;

        Ok(Self {
            id,
            contract_id: draft.contract_id,
            claim_id: draft.claim_id,
            reference_number: draft.reference_number,
            subject: draft.subject,
            description: draft.description,
            raised_by: actor.user_id.clone(),
            raised_at: now,
            agreement_deadline,
            status: DisagreementStatus::Open,
            engineer_determination: None,
            determination_date: None,
            resolution_summary: None,
        })
    }

    pub fn days_remaining(&self, now: TimeStamp) -> i64 {
        deadline::days_remaining(self.agreement_deadline, now)
    }

    pub fn is_overdue(&self, now: TimeStamp) -> bool {
        deadline::is_overdue(self.agreement_deadline, now, &self.status, &CLOCK_STOPPED)
    }

    fn transition(
        &mut self,
        action: Action,
        allowed: &[DisagreementStatus],
        to: DisagreementStatus,
    ) -> EngineResult<()> {
        if !allowed.contains(&self.status) {
            return Err(EngineError::invalid_state(&self.id, self.status, action));
        }
        self.status = to;
        Ok(())
    }

    pub fn begin_discussion(&mut self, actor: &Principal) -> EngineResult<()> {
        authorize_action(actor, Action::DiscussDisagreement)?;
        self.transition(
            Action::DiscussDisagreement,
            &[DisagreementStatus::Open],
            DisagreementStatus::UnderDiscussion,
        )
    }

    pub fn record_agreement(&mut self, summary: &str, actor: &Principal) -> EngineResult<()> {
        authorize_action(actor, Action::DiscussDisagreement)?;
        let summary = non_empty(summary, "resolution summary")?;
        self.transition(
            Action::DiscussDisagreement,
            &[DisagreementStatus::UnderDiscussion],
            DisagreementStatus::AgreementReached,
        )?;
        self.resolution_summary = Some(summary);
        Ok(())
    }

    pub fn request_determination(&mut self, actor: &Principal) -> EngineResult<()> {
        authorize_action(actor, Action::DiscussDisagreement)?;
        self.transition(
            Action::DiscussDisagreement,
            &[DisagreementStatus::Open, DisagreementStatus::UnderDiscussion],
            DisagreementStatus::DeterminationPending,
        )
    }

    /// `status` defaults to `determination_issued`; `resolved` closes the matter outright.
    pub fn issue_determination(
        &mut self,
        determination: &str,
        status: Option<DisagreementStatus>,
        actor: &Principal,
        now: TimeStamp,
    ) -> EngineResult<()> {
        authorize_action(actor, Action::DetermineDisagreement)?;
        let status = status.unwrap_or(DisagreementStatus::DeterminationIssued);
        if !matches!(
            status,
            DisagreementStatus::DeterminationIssued | DisagreementStatus::Resolved
        ) {
            return Err(ValidationError::DisallowedOutcome(status.to_string()).into());
        }
        let determination = non_empty(determination, "determination")?;
        self.transition(
            Action::DetermineDisagreement,
            &[
                DisagreementStatus::Open,
                DisagreementStatus::UnderDiscussion,
                DisagreementStatus::DeterminationPending,
            ],
            status,
        )?;

        self.engineer_determination = Some(determination);
        self.determination_date = Some(now);
        Ok(())
    }

    /// Manual escalation; nothing refers a disagreement automatically.
    pub fn refer_to_dab(&mut self, actor: &Principal) -> EngineResult<()> {
        authorize_action(actor, Action::ReferToDab)?;
        self.transition(
            Action::ReferToDab,
            &[DisagreementStatus::DeterminationPending],
            DisagreementStatus::ReferredToDab,
        )
    }

    pub fn resolve(&mut self, summary: &str, actor: &Principal) -> EngineResult<()> {
        authorize_action(actor, Action::ResolveDisagreement)?;
        let summary = non_empty(summary, "resolution summary")?;
        self.transition(
            Action::ResolveDisagreement,
            &[
                DisagreementStatus::AgreementReached,
                DisagreementStatus::DeterminationIssued,
            ],
            DisagreementStatus::Resolved,
        )?;
        self.resolution_summary = Some(summary);
        Ok(())
    }
}
