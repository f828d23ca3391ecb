//! Service layer API for contract administration workflows
//!
//! Each operation loads the record, applies the lifecycle transition against
//! the clock's `now`, writes it back with a conditional update on the status it
//! was read with, and journals the transition. Deadline outcomes (time-barred
//! claims, deemed no-objection) are derived on read; `reconcile_deadlines`
//! writes them into storage for consumers that filter on stored status.
use super::claim::{Claim, ClaimDetermination, ClaimNotice, ClaimStatus};
use super::config::EngineConfig;
use super::contract::{Contract, ContractDetails, ContractStatus, Money};
use super::deadline::{Clock, SystemClock, TimeStamp};
use super::disagreement::{Disagreement, DisagreementDraft, DisagreementStatus};
use super::document::{DocumentDraft, DocumentStatus, DocumentSubmission};
use super::error::{EngineError, EngineResult, ErrorKind, ValidationError};
use super::journal::{self, JournalEntry, Transition};
use super::role::{Action, AssignedEngineer, ContractScope, Principal, Unscoped, authorize_action};
use super::store::{Record, RecordStore, SledStore, Stateful};
use super::utils;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Natural-key tables: contract number, and `<contract id>/<claim number>`.
const CONTRACT_NUMBERS: &str = "contract_numbers";
const CLAIM_NUMBERS: &str = "claim_numbers";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimView {
    pub claim: Claim,
    pub effective_status: ClaimStatus,
    pub days_remaining: i64,
    pub is_overdue: bool,
    pub is_time_barred: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentView {
    pub document: DocumentSubmission,
    pub effective_status: DocumentStatus,
    pub days_remaining: i64,
    pub is_overdue: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisagreementView {
    pub disagreement: Disagreement,
    pub days_remaining: i64,
    pub is_overdue: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub time_barred: usize,
    pub no_objection: usize,
    /// Records another writer moved first; left for their writer.
    pub skipped: usize,
}

pub struct ContractAdminService<S: RecordStore = SledStore> {
    store: S,
    clock: Arc<dyn Clock>,
    scope: Box<dyn ContractScope>,
}

impl ContractAdminService<SledStore> {
    pub fn new(instance: Arc<sled::Db>) -> Self {
        Self::with_store(SledStore::new(instance))
    }

    pub fn from_config(config: &EngineConfig) -> EngineResult<Self> {
        let service = Self::with_store(SledStore::open(&config.store)?);
        if config.authorization.scope_to_assigned_engineer {
            return Ok(service.with_scope(AssignedEngineer));
        }
        Ok(service)
    }
}

impl<S: RecordStore> ContractAdminService<S> {
    pub fn with_store(store: S) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            scope: Box::new(Unscoped),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_scope(mut self, scope: impl ContractScope + 'static) -> Self {
        self.scope = Box::new(scope);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn now(&self) -> TimeStamp {
        self.clock.now()
    }

    fn new_id(hrp: &str) -> EngineResult<String> {
        utils::new_uuid_to_bech32(hrp).map_err(|e| EngineError::Codec(format!("identifier: {e}")))
    }

    fn load<R: Record>(&self, id: &str) -> EngineResult<R> {
        self.store.get::<R>(id)?.ok_or_else(|| EngineError::NotFound {
            table: R::TABLE,
            id: id.to_string(),
        })
    }

    /// Resolves a contract reference from caller input.
    fn referenced_contract(&self, contract_id: &str) -> EngineResult<Contract> {
        self.store
            .get::<Contract>(contract_id)?
            .ok_or_else(|| ValidationError::UnknownContract(contract_id.to_string()).into())
    }

    fn check_scope(&self, actor: &Principal, action: Action, contract_id: &str) -> EngineResult<()> {
        let contract = self.referenced_contract(contract_id)?;
        self.scope.check(actor, action, &contract)
    }

    fn journal<R: Stateful>(
        &self,
        record: &R,
        from: Option<R::Status>,
        actor: &Principal,
        action: Action,
        now: TimeStamp,
    ) -> EngineResult<()> {
        journal::append(
            &self.store,
            Transition {
                table: R::TABLE,
                record_id: record.id(),
                actor: &actor.user_id,
                timestamp: now,
                action,
                from: from.map(|s| s.to_string()),
                to: record.status().to_string(),
            },
        )?;
        let from = from.map(|s| s.to_string()).unwrap_or_default();
        info!(
            table = R::TABLE,
            record = record.id(),
            from = %from,
            to = %record.status(),
            actor = %actor.user_id,
            %action,
            "transition accepted"
        );
        Ok(())
    }

    fn create<R: Stateful>(&self, record: &R, actor: &Principal, action: Action, now: TimeStamp) -> EngineResult<()> {
        self.store.insert(record)?;
        self.journal(record, None, actor, action, now)
    }

    /// Like [`Self::create`], but `false` when `key` is already taken in `index`.
    fn create_unique<R: Stateful>(
        &self,
        record: &R,
        index: &'static str,
        key: &str,
        actor: &Principal,
        action: Action,
        now: TimeStamp,
    ) -> EngineResult<bool> {
        if !self.store.insert_unique(record, index, key)? {
            return Ok(false);
        }
        self.journal(record, None, actor, action, now)?;
        Ok(true)
    }

    /// Writes `record` only if the stored status is still `before`.
    fn commit<R: Stateful>(
        &self,
        record: &R,
        before: R::Status,
        actor: &Principal,
        action: Action,
        now: TimeStamp,
    ) -> EngineResult<()> {
        if let Err(e) = self.store.update(record, Some(before)) {
            if matches!(e.kind(), ErrorKind::InvalidState | ErrorKind::Conflict) {
                warn!(table = R::TABLE, record = record.id(), %action, error = %e, "lost update");
            }
            return Err(e);
        }
        self.journal(record, Some(before), actor, action, now)
    }

    /// Loads, transitions and commits one record; denials are logged and leave storage untouched.
    fn apply<R, F>(&self, id: &str, actor: &Principal, action: Action, transition: F) -> EngineResult<R>
    where
        R: Stateful,
        F: FnOnce(&mut R, TimeStamp) -> EngineResult<()>,
    {
        let now = self.now();
        let mut record = self.load::<R>(id)?;
        let before = record.status();
        if let Err(e) = transition(&mut record, now) {
            if e.kind() == ErrorKind::Authorization {
                warn!(table = R::TABLE, record = id, actor = %actor.user_id, %action, "permission denied");
            }
            return Err(e);
        }
        self.commit(&record, before, actor, action, now)?;
        Ok(record)
    }

    // ---- contracts ----

    pub fn register_contract(&self, details: ContractDetails, actor: &Principal) -> EngineResult<Contract> {
        authorize_action(actor, Action::RegisterContract)?;
        details.validate()?;
        let now = self.now();
        let contract = details.finalise(Self::new_id(utils::CONTRACT_HRP)?, &actor.user_id, now)?;
        let number = contract.contract_number.clone();
        if !self.create_unique(&contract, CONTRACT_NUMBERS, &number, actor, Action::RegisterContract, now)? {
            return Err(ValidationError::DuplicateContractNumber(number).into());
        }
        Ok(contract)
    }

    pub fn get_contract(&self, id: &str) -> EngineResult<Contract> {
        self.load(id)
    }

    pub fn contracts(&self) -> EngineResult<Vec<Contract>> {
        self.store.query(|_: &Contract| true)
    }

    pub fn change_contract_status(&self, id: &str, to: ContractStatus, actor: &Principal) -> EngineResult<Contract> {
        self.apply(id, actor, Action::ChangeContractStatus, |contract: &mut Contract, _| {
            authorize_action(actor, Action::ChangeContractStatus)?;
            contract.change_status(to)
        })
    }

    // ---- claims ----

    pub fn submit_claim_notice(&self, notice: ClaimNotice, actor: &Principal) -> EngineResult<Claim> {
        notice.validate()?;
        self.check_scope(actor, Action::SubmitClaimNotice, &notice.contract_id)?;

        let now = self.now();
        let claim = Claim::from_notice(Self::new_id(utils::CLAIM_HRP)?, notice, actor, now)?;
        let key = format!("{}/{}", claim.contract_id, claim.claim_number);
        if !self.create_unique(&claim, CLAIM_NUMBERS, &key, actor, Action::SubmitClaimNotice, now)? {
            return Err(ValidationError::DuplicateClaimNumber(claim.claim_number).into());
        }
        Ok(claim)
    }

    fn claim_in_scope(&self, id: &str, actor: &Principal, action: Action) -> EngineResult<()> {
        let claim = self.load::<Claim>(id)?;
        self.check_scope(actor, action, &claim.contract_id)
    }

    pub fn acknowledge_claim_notice(&self, id: &str, actor: &Principal) -> EngineResult<Claim> {
        self.claim_in_scope(id, actor, Action::AcknowledgeClaimNotice)?;
        self.apply(id, actor, Action::AcknowledgeClaimNotice, |claim: &mut Claim, now| {
            claim.acknowledge_notice(actor, now)
        })
    }

    pub fn submit_detailed_claim(
        &self,
        id: &str,
        amount_claimed: Option<Money>,
        time_extension_days: Option<u32>,
        actor: &Principal,
    ) -> EngineResult<Claim> {
        self.apply(id, actor, Action::SubmitDetailedClaim, |claim: &mut Claim, now| {
            claim.submit_detailed_claim(amount_claimed, time_extension_days, actor, now)
        })
    }

    pub fn begin_claim_review(&self, id: &str, actor: &Principal) -> EngineResult<Claim> {
        self.claim_in_scope(id, actor, Action::BeginClaimReview)?;
        self.apply(id, actor, Action::BeginClaimReview, |claim: &mut Claim, now| {
            claim.begin_review(actor, now)
        })
    }

    pub fn issue_claim_determination(
        &self,
        id: &str,
        outcome: ClaimDetermination,
        actor: &Principal,
    ) -> EngineResult<Claim> {
        authorize_action(actor, Action::DetermineClaim)?;
        self.claim_in_scope(id, actor, Action::DetermineClaim)?;
        self.apply(id, actor, Action::DetermineClaim, |claim: &mut Claim, now| {
            claim.issue_determination(outcome, actor, now)
        })
    }

    pub fn withdraw_claim(&self, id: &str, actor: &Principal) -> EngineResult<Claim> {
        self.apply(id, actor, Action::WithdrawClaim, |claim: &mut Claim, now| {
            claim.withdraw(actor, now)
        })
    }

    fn view_claim(&self, claim: Claim, now: TimeStamp) -> ClaimView {
        let effective_status = claim.effective_status(now);
        if effective_status != claim.status {
            debug!(claim = %claim.id, stored = %claim.status, %effective_status, "derived claim status");
        }
        ClaimView {
            effective_status,
            days_remaining: claim.days_remaining(now),
            is_overdue: claim.is_overdue(now),
            is_time_barred: claim.is_time_barred(now),
            claim,
        }
    }

    pub fn claim_view(&self, id: &str) -> EngineResult<ClaimView> {
        let claim = self.load::<Claim>(id)?;
        Ok(self.view_claim(claim, self.now()))
    }

    pub fn claims(&self, contract_id: &str) -> EngineResult<Vec<ClaimView>> {
        let now = self.now();
        let claims = self.store.query(|c: &Claim| c.contract_id == contract_id)?;
        Ok(claims.into_iter().map(|c| self.view_claim(c, now)).collect())
    }

    /// Pending claims whose detailed claim is due within `within_days`, soonest first.
    pub fn claims_at_risk(&self, contract_id: &str, within_days: i64) -> EngineResult<Vec<ClaimView>> {
        let mut views: Vec<ClaimView> = self
            .claims(contract_id)?
            .into_iter()
            .filter(|v| v.effective_status.is_pending() && v.days_remaining <= within_days)
            .collect();
        views.sort_by_key(|v| v.days_remaining);
        Ok(views)
    }

    // ---- documents ----

    /// Submits a document, or a new revision when `parent_id` is given.
    pub fn submit_document(
        &self,
        draft: DocumentDraft,
        parent_id: Option<&str>,
        actor: &Principal,
    ) -> EngineResult<DocumentSubmission> {
        draft.validate()?;
        self.check_scope(actor, Action::SubmitDocument, &draft.contract_id)?;
        let now = self.now();

        let parent = match parent_id {
            Some(pid) => {
                let parent = self.load::<DocumentSubmission>(pid)?;
                if parent.contract_id != draft.contract_id {
                    return Err(ValidationError::ContractMismatch {
                        record: parent.id,
                        expected: draft.contract_id,
                        actual: parent.contract_id,
                    }
                    .into());
                }
                Some(parent)
            }
            None => None,
        };

        let document = DocumentSubmission::submit(
            Self::new_id(utils::DOCUMENT_HRP)?,
            draft,
            parent.as_ref(),
            actor,
            now,
        )?;

        match parent {
            Some(mut parent) => {
                let before = parent.status;
                parent.supersede()?;
                if let Err(e) = self.store.insert_superseding(&document, &parent, before) {
                    if matches!(e.kind(), ErrorKind::InvalidState | ErrorKind::Conflict) {
                        warn!(document = %parent.id, error = %e, "lost resubmission");
                    }
                    return Err(e);
                }
                self.journal(&parent, Some(before), actor, Action::SubmitDocument, now)?;
                self.journal(&document, None, actor, Action::SubmitDocument, now)?;
            }
            None => self.create(&document, actor, Action::SubmitDocument, now)?,
        }
        Ok(document)
    }

    pub fn begin_document_review(&self, id: &str, actor: &Principal) -> EngineResult<DocumentSubmission> {
        self.apply(id, actor, Action::BeginDocumentReview, |doc: &mut DocumentSubmission, now| {
            doc.begin_review(actor, now)
        })
    }

    pub fn review_document(
        &self,
        id: &str,
        outcome: DocumentStatus,
        comments: Option<String>,
        actor: &Principal,
    ) -> EngineResult<DocumentSubmission> {
        self.apply(id, actor, Action::ReviewDocument, |doc: &mut DocumentSubmission, now| {
            doc.review(outcome, comments, actor, now)
        })
    }

    fn view_document(&self, document: DocumentSubmission, now: TimeStamp) -> DocumentView {
        let effective_status = document.effective_status(now);
        if effective_status != document.status {
            debug!(document = %document.id, stored = %document.status, %effective_status, "derived document status");
        }
        DocumentView {
            effective_status,
            days_remaining: document.days_remaining(now),
            is_overdue: document.is_overdue(now),
            document,
        }
    }

    pub fn document_view(&self, id: &str) -> EngineResult<DocumentView> {
        let document = self.load::<DocumentSubmission>(id)?;
        Ok(self.view_document(document, self.now()))
    }

    pub fn documents(&self, contract_id: &str) -> EngineResult<Vec<DocumentView>> {
        let now = self.now();
        let documents = self
            .store
            .query(|d: &DocumentSubmission| d.contract_id == contract_id)?;
        Ok(documents
            .into_iter()
            .map(|d| self.view_document(d, now))
            .collect())
    }

    /// Submissions the reviewer let lapse; their effective status is `no_objection`.
    pub fn overdue_documents(&self, contract_id: &str) -> EngineResult<Vec<DocumentView>> {
        Ok(self
            .documents(contract_id)?
            .into_iter()
            .filter(|v| v.is_overdue)
            .collect())
    }

    // ---- disagreements ----

    pub fn raise_disagreement(&self, draft: DisagreementDraft, actor: &Principal) -> EngineResult<Disagreement> {
        draft.validate()?;
        self.check_scope(actor, Action::RaiseDisagreement, &draft.contract_id)?;
        if let Some(claim_id) = &draft.claim_id {
            let claim = self
                .store
                .get::<Claim>(claim_id)?
                .ok_or_else(|| ValidationError::UnknownClaim(claim_id.clone()))?;
            if claim.contract_id != draft.contract_id {
                return Err(ValidationError::ContractMismatch {
                    record: claim.id,
                    expected: draft.contract_id,
                    actual: claim.contract_id,
                }
                .into());
            }
        }

        let now = self.now();
        let disagreement = Disagreement::raise(Self::new_id(utils::DISAGREEMENT_HRP)?, draft, actor, now)?;
        self.create(&disagreement, actor, Action::RaiseDisagreement, now)?;
        Ok(disagreement)
    }

    pub fn begin_discussion(&self, id: &str, actor: &Principal) -> EngineResult<Disagreement> {
        self.apply(id, actor, Action::DiscussDisagreement, |d: &mut Disagreement, _| {
            d.begin_discussion(actor)
        })
    }

    pub fn record_agreement(&self, id: &str, summary: &str, actor: &Principal) -> EngineResult<Disagreement> {
        self.apply(id, actor, Action::DiscussDisagreement, |d: &mut Disagreement, _| {
            d.record_agreement(summary, actor)
        })
    }

    pub fn request_determination(&self, id: &str, actor: &Principal) -> EngineResult<Disagreement> {
        self.apply(id, actor, Action::DiscussDisagreement, |d: &mut Disagreement, _| {
            d.request_determination(actor)
        })
    }

    pub fn issue_disagreement_determination(
        &self,
        id: &str,
        determination: &str,
        status: Option<DisagreementStatus>,
        actor: &Principal,
    ) -> EngineResult<Disagreement> {
        authorize_action(actor, Action::DetermineDisagreement)?;
        let disagreement = self.load::<Disagreement>(id)?;
        self.check_scope(actor, Action::DetermineDisagreement, &disagreement.contract_id)?;
        self.apply(id, actor, Action::DetermineDisagreement, |d: &mut Disagreement, now| {
            d.issue_determination(determination, status, actor, now)
        })
    }

    pub fn refer_to_dab(&self, id: &str, actor: &Principal) -> EngineResult<Disagreement> {
        self.apply(id, actor, Action::ReferToDab, |d: &mut Disagreement, _| {
            d.refer_to_dab(actor)
        })
    }

    pub fn resolve_disagreement(&self, id: &str, summary: &str, actor: &Principal) -> EngineResult<Disagreement> {
        self.apply(id, actor, Action::ResolveDisagreement, |d: &mut Disagreement, _| {
            d.resolve(summary, actor)
        })
    }

    pub fn disagreement_view(&self, id: &str) -> EngineResult<DisagreementView> {
        let now = self.now();
        let disagreement = self.load::<Disagreement>(id)?;
        Ok(DisagreementView {
            days_remaining: disagreement.days_remaining(now),
            is_overdue: disagreement.is_overdue(now),
            disagreement,
        })
    }

    // ---- deadlines, history, change feeds ----

    /// Writes derived deadline outcomes into stored status. Safe to run repeatedly.
    pub fn reconcile_deadlines(&self, actor: &Principal) -> EngineResult<ReconcileReport> {
        authorize_action(actor, Action::ReconcileDeadlines)?;
        let now = self.now();
        let mut report = ReconcileReport::default();

        for mut claim in self.store.query(|c: &Claim| c.status.is_pending())? {
            let before = claim.status;
            if !claim.mark_time_barred(now) {
                continue;
            }
            match self.commit(&claim, before, actor, Action::ReconcileDeadlines, now) {
                Ok(()) => report.time_barred += 1,
                Err(e) if matches!(e.kind(), ErrorKind::InvalidState | ErrorKind::Conflict) => {
                    report.skipped += 1
                }
                Err(e) => return Err(e),
            }
        }

        for mut document in self
            .store
            .query(|d: &DocumentSubmission| d.status == DocumentStatus::Submitted)?
        {
            if !document.mark_no_objection(now) {
                continue;
            }
            match self.commit(
                &document,
                DocumentStatus::Submitted,
                actor,
                Action::ReconcileDeadlines,
                now,
            ) {
                Ok(()) => report.no_objection += 1,
                Err(e) if matches!(e.kind(), ErrorKind::InvalidState | ErrorKind::Conflict) => {
                    report.skipped += 1
                }
                Err(e) => return Err(e),
            }
        }

        debug!(
            time_barred = report.time_barred,
            no_objection = report.no_objection,
            skipped = report.skipped,
            "deadline reconciliation finished"
        );
        Ok(report)
    }

    pub fn history(&self, record_id: &str) -> EngineResult<Vec<JournalEntry>> {
        journal::history(&self.store, record_id)
    }

    pub fn subscribe<R: Record>(&self) -> EngineResult<S::Feed<R>> {
        self.store.subscribe::<R>()
    }
}
