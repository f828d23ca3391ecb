//! Clause 5 contractor's documents and the 21-day review period
//!
//! A submission the Engineer leaves in `submitted` past its review deadline is
//! treated as `no_objection`. This is derived on every read and every
//! transition through [`DocumentSubmission::effective_status`]; the stored
//! status only catches up when the service reconciles deadlines.
use super::deadline::{self, DOCUMENT_REVIEW_PERIOD_DAYS, TimeStamp};
use super::error::{EngineError, EngineResult, ValidationError};
use super::role::{Action, Principal, authorize_action};

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentType {
    #[n(0)]
    DesignDrawing,
    #[n(1)]
    ShopDrawing,
    #[n(2)]
    Specification,
    #[n(3)]
    Calculation,
    #[n(4)]
    MethodStatement,
    #[n(5)]
    Programme,
    #[n(6)]
    MaterialSubmittal,
    #[n(7)]
    AsBuiltRecord,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::DesignDrawing => "design_drawing",
            DocumentType::ShopDrawing => "shop_drawing",
            DocumentType::Specification => "specification",
            DocumentType::Calculation => "calculation",
            DocumentType::MethodStatement => "method_statement",
            DocumentType::Programme => "programme",
            DocumentType::MaterialSubmittal => "material_submittal",
            DocumentType::AsBuiltRecord => "as_built_record",
        }
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentStatus {
    #[n(0)]
    Submitted,
    #[n(1)]
    UnderReview,
    #[n(2)]
    Approved,
    #[n(3)]
    ApprovedWithComments,
    #[n(4)]
    Rejected,
    #[n(5)]
    NoObjection,
    #[n(6)]
    Superseded,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Submitted => "submitted",
            DocumentStatus::UnderReview => "under_review",
            DocumentStatus::Approved => "approved",
            DocumentStatus::ApprovedWithComments => "approved_with_comments",
            DocumentStatus::Rejected => "rejected",
            DocumentStatus::NoObjection => "no_objection",
            DocumentStatus::Superseded => "superseded",
        }
    }
    /// Outcomes a reviewer may choose. `no_objection` only arises from silence.
    pub fn is_review_outcome(&self) -> bool {
        matches!(
            self,
            DocumentStatus::Approved | DocumentStatus::ApprovedWithComments | DocumentStatus::Rejected
        )
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// once a document leaves `submitted` the review clock no longer applies
const CLOCK_STOPPED: [DocumentStatus; 6] = [
    DocumentStatus::UnderReview,
    DocumentStatus::Approved,
    DocumentStatus::ApprovedWithComments,
    DocumentStatus::Rejected,
    DocumentStatus::NoObjection,
    DocumentStatus::Superseded,
];

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct DocumentSubmission {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub contract_id: String,
    #[n(2)]
    pub document_type: DocumentType,
    #[n(3)]
    pub reference_number: String,
    #[n(4)]
    pub title: String,
    #[n(5)]
    pub description: Option<String>,
    #[n(6)]
    pub submitted_by: String,
    #[n(7)]
    pub submitted_at: TimeStamp,
    #[n(8)]
    pub review_deadline: TimeStamp,
    #[n(9)]
    pub reviewed_by: Option<String>,
    #[n(10)]
    pub reviewed_at: Option<TimeStamp>,
    #[n(11)]
    pub status: DocumentStatus,
    #[n(12)]
    pub review_comments: Option<String>,
    #[n(13)]
    pub revision_number: u32,
    #[n(14)]
    pub parent_submission_id: Option<String>,
}

/// Input to a document submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentDraft {
    pub contract_id: String,
    pub document_type: DocumentType,
    pub reference_number: String,
    pub title: String,
    pub description: Option<String>,
}

impl DocumentDraft {
    pub fn new(contract_id: &str, document_type: DocumentType, reference_number: &str, title: &str) -> Self {
        Self {
            contract_id: contract_id.to_string(),
            document_type,
            reference_number: reference_number.trim().to_string(),
            title: title.trim().to_string(),
            description: None,
        }
    }
    pub fn set_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.contract_id.is_empty() {
            return Err(ValidationError::EmptyField("contract id"));
        }
        if self.reference_number.is_empty() {
            return Err(ValidationError::EmptyField("reference number"));
        }
        if self.title.is_empty() {
            return Err(ValidationError::EmptyField("title"));
        }
        Ok(())
    }
}

impl DocumentSubmission {
    /// Creates revision 1, or `parent.revision_number + 1` when resubmitting.
    /// The parent itself is superseded by [`DocumentSubmission::supersede`].
    pub fn submit(
        id: String,
        draft: DocumentDraft,
        parent: Option<&DocumentSubmission>,
        actor: &Principal,
        now: TimeStamp,
    ) -> EngineResult<Self> {
        authorize_action(actor, Action::SubmitDocument)?;
        draft.validate()?;
        let review_deadline = deadline::add_days(now, DOCUMENT_REVIEW_PERIOD_DAYS)?;
        let (revision_number, parent_submission_id) = match parent {
            Some(p) => (p.revision_number + 1, Some(p.id.clone())),
            None => (1, None),
        };

        Ok(Self {
            id,
            contract_id: draft.contract_id,
            document_type: draft.document_type,
            reference_number: draft.reference_number,
            title: draft.title,
            description: draft.description,
            submitted_by: actor.user_id.clone(),
            submitted_at: now,
            review_deadline,
            reviewed_by: None,
            reviewed_at: None,
            status: DocumentStatus::Submitted,
            review_comments: None,
            revision_number,
            parent_submission_id,
        })
    }

    pub fn is_overdue(&self, now: TimeStamp) -> bool {
        deadline::is_overdue(self.review_deadline, now, &self.status, &CLOCK_STOPPED)
    }

    pub fn effective_status(&self, now: TimeStamp) -> DocumentStatus {
        if self.is_overdue(now) {
            return DocumentStatus::NoObjection;
        }
        self.status
    }

    pub fn days_remaining(&self, now: TimeStamp) -> i64 {
        deadline::days_remaining(self.review_deadline, now)
    }

    /// Writes the deemed no-objection into the record. Returns whether anything changed.
    pub fn mark_no_objection(&mut self, now: TimeStamp) -> bool {
        if !self.is_overdue(now) {
            return false;
        }
        self.status = DocumentStatus::NoObjection;
        true
    }

    fn require(&self, now: TimeStamp, action: Action, allowed: &[DocumentStatus]) -> EngineResult<()> {
        let current = self.effective_status(now);
        if allowed.contains(&current) {
            return Ok(());
        }
        Err(EngineError::invalid_state(&self.id, current, action))
    }

    pub fn begin_review(&mut self, actor: &Principal, now: TimeStamp) -> EngineResult<()> {
        authorize_action(actor, Action::BeginDocumentReview)?;
        self.require(now, Action::BeginDocumentReview, &[DocumentStatus::Submitted])?;
        self.status = DocumentStatus::UnderReview;
        Ok(())
    }

    pub fn review(
        &mut self,
        outcome: DocumentStatus,
        comments: Option<String>,
        actor: &Principal,
        now: TimeStamp,
    ) -> EngineResult<()> {
        authorize_action(actor, Action::ReviewDocument)?;
        if !outcome.is_review_outcome() {
            return Err(ValidationError::DisallowedOutcome(outcome.to_string()).into());
        }
        self.require(
            now,
            Action::ReviewDocument,
            &[DocumentStatus::Submitted, DocumentStatus::UnderReview],
        )?;

        self.status = outcome;
        self.review_comments = comments;
        self.reviewed_by = Some(actor.user_id.clone());
        self.reviewed_at = Some(now);
        Ok(())
    }

    /// Marks this submission as replaced by a newer revision.
    pub fn supersede(&mut self) -> EngineResult<()> {
        if self.status == DocumentStatus::Superseded {
            return Err(EngineError::invalid_state(
                &self.id,
                self.status,
                Action::SubmitDocument,
            ));
        }
        self.status = DocumentStatus::Superseded;
        Ok(())
    }
}
