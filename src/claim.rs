//! Clause 20 claims: notice, detailed claim, Engineer's determination
//!
//! A claim starts its 84-day clock on notice. If no detailed claim is lodged
//! before the due date while the claim is still pending, it is time-barred.
//! That outcome is derived at read time from the clock; see
//! [`Claim::effective_status`].
use super::contract::Money;
use super::deadline::{self, CLAIM_DETAILS_PERIOD_DAYS, TimeStamp};
use super::error::{EngineError, EngineResult, ValidationError};
use super::role::{Action, Principal, authorize_action};

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimantType {
    #[n(0)]
    Contractor,
    #[n(1)]
    Employer,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClaimStatus {
    #[n(0)]
    NoticeSubmitted,
    #[n(1)]
    DetailedClaimPending,
    #[n(2)]
    DetailedClaimSubmitted,
    #[n(3)]
    UnderReview,
    #[n(4)]
    Approved,
    #[n(5)]
    PartiallyApproved,
    #[n(6)]
    Rejected,
    #[n(7)]
    TimeBarred,
    #[n(8)]
    Withdrawn,
}

impl ClaimStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimStatus::NoticeSubmitted => "notice_submitted",
            ClaimStatus::DetailedClaimPending => "detailed_claim_pending",
            ClaimStatus::DetailedClaimSubmitted => "detailed_claim_submitted",
            ClaimStatus::UnderReview => "under_review",
            ClaimStatus::Approved => "approved",
            ClaimStatus::PartiallyApproved => "partially_approved",
            ClaimStatus::Rejected => "rejected",
            ClaimStatus::TimeBarred => "time_barred",
            ClaimStatus::Withdrawn => "withdrawn",
        }
    }
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ClaimStatus::Approved
                | ClaimStatus::PartiallyApproved
                | ClaimStatus::Rejected
                | ClaimStatus::TimeBarred
                | ClaimStatus::Withdrawn
        )
    }
    /// Statuses in which the detailed-claim clock is still running.
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            ClaimStatus::NoticeSubmitted | ClaimStatus::DetailedClaimPending
        )
    }
    pub fn is_determination(&self) -> bool {
        matches!(
            self,
            ClaimStatus::Approved | ClaimStatus::PartiallyApproved | ClaimStatus::Rejected
        )
    }
}

impl std::fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// every status except notice_submitted and detailed_claim_pending
const CLOCK_STOPPED: [ClaimStatus; 7] = [
    ClaimStatus::DetailedClaimSubmitted,
    ClaimStatus::UnderReview,
    ClaimStatus::Approved,
    ClaimStatus::PartiallyApproved,
    ClaimStatus::Rejected,
    ClaimStatus::TimeBarred,
    ClaimStatus::Withdrawn,
];

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Claim {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub contract_id: String,
    #[n(2)]
    pub claim_number: String,
    #[n(3)]
    pub claimant_type: ClaimantType,
    #[n(4)]
    pub title: String,
    #[n(5)]
    pub description: Option<String>,
    #[n(6)]
    pub clause_reference: Option<String>,
    #[n(7)]
    pub notice_date: TimeStamp,
    #[n(8)]
    pub detailed_claim_due_date: TimeStamp,
    #[n(9)]
    pub detailed_claim_submitted_at: Option<TimeStamp>,
    #[n(10)]
    pub amount_claimed: Option<Money>,
    #[n(11)]
    pub time_extension_days: Option<u32>,
    #[n(12)]
    pub status: ClaimStatus,
    #[n(13)]
    pub engineer_determination: Option<String>,
    #[n(14)]
    pub determination_date: Option<TimeStamp>,
    #[n(15)]
    pub amount_approved: Option<Money>,
    #[n(16)]
    pub time_approved_days: Option<u32>,
    #[n(17)]
    pub is_time_barred: bool,
    #[n(18)]
    pub submitted_by: String,
}

/// Input to a notice of claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimNotice {
    pub contract_id: String,
    pub claim_number: String,
    pub claimant_type: ClaimantType,
    pub title: String,
    pub description: Option<String>,
    pub clause_reference: Option<String>,
    pub amount_claimed: Option<Money>,
    pub time_extension_days: Option<u32>,
}

impl ClaimNotice {
    pub fn new(contract_id: &str, claim_number: &str, claimant_type: ClaimantType, title: &str) -> Self {
        Self {
            contract_id: contract_id.to_string(),
            claim_number: claim_number.trim().to_string(),
            claimant_type,
            title: title.trim().to_string(),
            description: None,
            clause_reference: None,
            amount_claimed: None,
            time_extension_days: None,
        }
    }
    pub fn set_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }
    pub fn set_clause_reference(mut self, clause: &str) -> Self {
        self.clause_reference = Some(clause.to_string());
        self
    }
    pub fn set_amount_claimed(mut self, amount: Money) -> Self {
        self.amount_claimed = Some(amount);
        self
    }
    pub fn set_time_extension_days(mut self, days: u32) -> Self {
        self.time_extension_days = Some(days);
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.contract_id.is_empty() {
            return Err(ValidationError::EmptyField("contract id"));
        }
        if self.claim_number.is_empty() {
            return Err(ValidationError::EmptyField("claim number"));
        }
        if self.title.is_empty() {
            return Err(ValidationError::EmptyField("title"));
        }
        if let Some(amount) = self.amount_claimed {
            amount.validate("amount claimed")?;
        }
        Ok(())
    }
}

/// The Engineer's decision on a claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimDetermination {
    pub status: ClaimStatus,
    pub determination: Option<String>,
    pub amount_approved: Option<Money>,
    pub time_approved_days: Option<u32>,
}

impl ClaimDetermination {
    pub fn new(status: ClaimStatus) -> Self {
        Self {
            status,
            determination: None,
            amount_approved: None,
            time_approved_days: None,
        }
    }
    pub fn set_determination(mut self, text: &str) -> Self {
        self.determination = Some(text.to_string());
        self
    }
    pub fn set_amount_approved(mut self, amount: Money) -> Self {
        self.amount_approved = Some(amount);
        self
    }
    pub fn set_time_approved_days(mut self, days: u32) -> Self {
        self.time_approved_days = Some(days);
        self
    }
}

impl Claim {
    /// Files a notice of claim. The due date is fixed here and never recomputed.
    pub fn from_notice(id: String, notice: ClaimNotice, actor: &Principal, now: TimeStamp) -> EngineResult<Self> {
        authorize_action(actor, Action::SubmitClaimNotice)?;
        notice.validate()?;
        let detailed_claim_due_date = deadline::add_days(now, CLAIM_DETAILS_PERIOD_DAYS)?;

        Ok(Self {
            id,
            contract_id: notice.contract_id,
            claim_number: notice.claim_number,
            claimant_type: notice.claimant_type,
            title: notice.title,
            description: notice.description,
            clause_reference: notice.clause_reference,
            notice_date: now,
            detailed_claim_due_date,
            detailed_claim_submitted_at: None,
            amount_claimed: notice.amount_claimed,
            time_extension_days: notice.time_extension_days,
            status: ClaimStatus::NoticeSubmitted,
            engineer_determination: None,
            determination_date: None,
            amount_approved: None,
            time_approved_days: None,
            is_time_barred: false,
            submitted_by: actor.user_id.clone(),
        })
    }

    pub fn is_time_barred(&self, now: TimeStamp) -> bool {
        self.is_time_barred || self.is_overdue(now)
    }

    pub fn effective_status(&self, now: TimeStamp) -> ClaimStatus {
        if self.is_time_barred(now) {
            return ClaimStatus::TimeBarred;
        }
        self.status
    }

    pub fn days_remaining(&self, now: TimeStamp) -> i64 {
        deadline::days_remaining(self.detailed_claim_due_date, now)
    }

    /// Overdue only matters while a detailed claim is still awaited.
    pub fn is_overdue(&self, now: TimeStamp) -> bool {
        self.detailed_claim_submitted_at.is_none()
            && deadline::is_overdue(
                self.detailed_claim_due_date,
                now,
                &self.status,
                &CLOCK_STOPPED,
            )
    }

    /// Writes the time-barred outcome into the record. Returns whether anything changed.
    pub fn mark_time_barred(&mut self, now: TimeStamp) -> bool {
        if self.status == ClaimStatus::TimeBarred || !self.is_time_barred(now) {
            return false;
        }
        self.status = ClaimStatus::TimeBarred;
        self.is_time_barred = true;
        true
    }

    fn require(&self, now: TimeStamp, action: Action, allowed: &[ClaimStatus]) -> EngineResult<()> {
        let current = self.effective_status(now);
        if allowed.contains(&current) {
            return Ok(());
        }
        Err(EngineError::invalid_state(&self.id, current, action))
    }

    fn require_claimant(&self, actor: &Principal, action: Action) -> EngineResult<()> {
        if actor.user_id != self.submitted_by {
            return Err(EngineError::NotOwner {
                record: self.id.clone(),
                action,
            });
        }
        Ok(())
    }

    pub fn acknowledge_notice(&mut self, actor: &Principal, now: TimeStamp) -> EngineResult<()> {
        authorize_action(actor, Action::AcknowledgeClaimNotice)?;
        self.require(now, Action::AcknowledgeClaimNotice, &[ClaimStatus::NoticeSubmitted])?;
        self.status = ClaimStatus::DetailedClaimPending;
        Ok(())
    }

    /// Lodges the fully detailed claim. Amounts given here replace those in the notice.
    pub fn submit_detailed_claim(
        &mut self,
        amount_claimed: Option<Money>,
        time_extension_days: Option<u32>,
        actor: &Principal,
        now: TimeStamp,
    ) -> EngineResult<()> {
        authorize_action(actor, Action::SubmitDetailedClaim)?;
        self.require_claimant(actor, Action::SubmitDetailedClaim)?;
        if let Some(amount) = amount_claimed {
            amount.validate("amount claimed")?;
        }
        self.require(
            now,
            Action::SubmitDetailedClaim,
            &[ClaimStatus::NoticeSubmitted, ClaimStatus::DetailedClaimPending],
        )?;

        self.detailed_claim_submitted_at = Some(now);
        if amount_claimed.is_some() {
            self.amount_claimed = amount_claimed;
        }
        if time_extension_days.is_some() {
            self.time_extension_days = time_extension_days;
        }
        self.status = ClaimStatus::DetailedClaimSubmitted;
        Ok(())
    }

    pub fn begin_review(&mut self, actor: &Principal, now: TimeStamp) -> EngineResult<()> {
        authorize_action(actor, Action::BeginClaimReview)?;
        self.require(now, Action::BeginClaimReview, &[ClaimStatus::DetailedClaimSubmitted])?;
        self.status = ClaimStatus::UnderReview;
        Ok(())
    }

    /// Engineer's determination. Fails on terminal claims rather than overwriting them.
    pub fn issue_determination(
        &mut self,
        outcome: ClaimDetermination,
        actor: &Principal,
        now: TimeStamp,
    ) -> EngineResult<()> {
        authorize_action(actor, Action::DetermineClaim)?;
        if !outcome.status.is_determination() {
            return Err(ValidationError::DisallowedOutcome(outcome.status.to_string()).into());
        }
        if let Some(amount) = outcome.amount_approved {
            amount.validate("amount approved")?;
        }
        self.require(
            now,
            Action::DetermineClaim,
            &[ClaimStatus::DetailedClaimSubmitted, ClaimStatus::UnderReview],
        )?;

        self.status = outcome.status;
        self.engineer_determination = outcome.determination;
        self.determination_date = Some(now);
        if outcome.amount_approved.is_some() {
            self.amount_approved = outcome.amount_approved;
        }
        if outcome.time_approved_days.is_some() {
            self.time_approved_days = outcome.time_approved_days;
        }
        Ok(())
    }

    pub fn withdraw(&mut self, actor: &Principal, now: TimeStamp) -> EngineResult<()> {
        authorize_action(actor, Action::WithdrawClaim)?;
        self.require_claimant(actor, Action::WithdrawClaim)?;
        let current = self.effective_status(now);
        if current.is_terminal() {
            return Err(EngineError::invalid_state(&self.id, current, Action::WithdrawClaim));
        }
        self.status = ClaimStatus::Withdrawn;
        Ok(())
    }
}
