//! Smoke Screen Unit tests for the rule engine components
//!
//! These tests exercise each module in isolation, without a record store.
//! They mostly cover the happy path plus the one or two rejections each
//! transition is defined by.

use contract_admin::{
    EngineError, ErrorKind, ValidationError,
    claim::{Claim, ClaimDetermination, ClaimNotice, ClaimStatus, ClaimantType},
    contract::{ContractDetails, ContractStatus, Money},
    deadline::{self, TimeStamp},
    disagreement::{Disagreement, DisagreementDraft, DisagreementStatus},
    document::{DocumentDraft, DocumentStatus, DocumentSubmission, DocumentType},
    role::{self, Action, AssignedEngineer, ContractScope, Principal, Role, Unscoped},
    utils::new_uuid_to_bech32,
};

fn jan_1() -> TimeStamp {
    TimeStamp::new_with(2024, 1, 1, 0, 0, 0)
}

fn engineer() -> Principal {
    Principal::new("user_engineer").with_role(Role::Engineer)
}

fn contractor() -> Principal {
    Principal::new("user_contractor").with_role(Role::Contractor)
}

// UTILS MODULE TESTS
mod utils_tests {
    use super::*;

    /// Identifiers carry their record prefix
    #[test]
    fn generates_prefixed_ids() {
        let id = new_uuid_to_bech32("claim_").unwrap();
        assert!(id.starts_with("claim_1"));
    }

    #[test]
    fn generates_unique_ids() {
        let a = new_uuid_to_bech32("doc_").unwrap();
        let b = new_uuid_to_bech32("doc_").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn rejects_empty_prefix() {
        assert!(new_uuid_to_bech32("").is_err());
    }
}

// DEADLINE MODULE TESTS
mod deadline_tests {
    use super::*;

    #[test]
    fn statutory_periods() {
        assert_eq!(
            deadline::add_days(jan_1(), deadline::CLAIM_DETAILS_PERIOD_DAYS).unwrap(),
            TimeStamp::new_with(2024, 3, 25, 0, 0, 0)
        );
        assert_eq!(
            deadline::add_days(jan_1(), deadline::DOCUMENT_REVIEW_PERIOD_DAYS).unwrap(),
            TimeStamp::new_with(2024, 1, 22, 0, 0, 0)
        );
        assert_eq!(
            deadline::add_days(jan_1(), deadline::AGREEMENT_PERIOD_DAYS).unwrap(),
            TimeStamp::new_with(2024, 2, 12, 0, 0, 0)
        );
    }

    #[test]
    fn days_remaining_goes_negative_when_overdue() {
        let deadline = TimeStamp::new_with(2024, 1, 22, 0, 0, 0);
        assert_eq!(deadline::days_remaining(deadline, TimeStamp::new_with(2024, 1, 20, 0, 0, 0)), 2);
        assert_eq!(deadline::days_remaining(deadline, TimeStamp::new_with(2024, 1, 25, 0, 0, 0)), -3);
    }

    #[test]
    fn exempt_status_is_never_overdue() {
        let deadline = TimeStamp::new_with(2024, 1, 22, 0, 0, 0);
        let late = TimeStamp::new_with(2024, 2, 1, 0, 0, 0);
        let exempt = [DocumentStatus::Approved];
        assert!(deadline::is_overdue(deadline, late, &DocumentStatus::Submitted, &exempt));
        assert!(!deadline::is_overdue(deadline, late, &DocumentStatus::Approved, &exempt));
        assert!(!deadline::is_overdue(deadline, deadline, &DocumentStatus::Submitted, &exempt));
    }
}

// ROLE MODULE TESTS
mod role_tests {
    use super::*;

    #[test]
    fn principals_hold_several_roles() {
        let p = Principal::new("user_x")
            .with_role(Role::Engineer)
            .with_role(Role::ProjectArchitect);
        assert!(role::has_role(&p, Role::Engineer));
        assert!(role::has_role(&p, Role::ProjectArchitect));
        assert!(!role::has_role(&p, Role::Contractor));
    }

    #[test]
    fn authorize_needs_any_one_required_role() {
        let architect = Principal::new("user_a").with_role(Role::ProjectArchitect);
        assert!(role::authorize(&architect, Action::ReviewDocument, &[Role::Engineer, Role::ProjectArchitect]).is_ok());

        let err = role::authorize(&architect, Action::DetermineClaim, &[Role::Engineer]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization);
        assert!(err.to_string().contains("engineer"));
    }

    #[test]
    fn role_free_actions_admit_anyone() {
        let nobody = Principal::new("user_nobody");
        assert!(role::authorize_action(&nobody, Action::SubmitClaimNotice).is_ok());
        assert!(role::authorize_action(&nobody, Action::RaiseDisagreement).is_ok());
    }

    #[test]
    fn assigned_engineer_only_narrows_engineer_actions() {
        let contract = ContractDetails::new()
            .set_contract_number("RB-1")
            .set_title("Works")
            .set_engineer("user_assigned")
            .finalise("contract_1".into(), "user_owner", jan_1())
            .unwrap();
        let stranger = Principal::new("user_other").with_role(Role::Engineer);

        assert!(AssignedEngineer.check(&stranger, Action::DetermineClaim, &contract).is_err());
        assert!(AssignedEngineer.check(&stranger, Action::ReviewDocument, &contract).is_ok());
        assert!(Unscoped.check(&stranger, Action::DetermineClaim, &contract).is_ok());
    }
}

// CONTRACT MODULE TESTS
mod contract_tests {
    use super::*;

    #[test]
    fn rejects_out_of_range_percentages() {
        let details = ContractDetails::new()
            .set_contract_number("RB-1")
            .set_title("Works")
            .set_retention(10_001);
        assert!(matches!(
            details.validate(),
            Err(ValidationError::PercentOutOfRange { field: "retention", .. })
        ));
    }

    #[test]
    fn rejects_negative_amount() {
        let details = ContractDetails::new()
            .set_contract_number("RB-1")
            .set_title("Works")
            .set_accepted_amount(Money(-100));
        assert!(matches!(details.validate(), Err(ValidationError::NegativeAmount(_))));
    }

    #[test]
    fn status_transitions() {
        let mut contract = ContractDetails::new()
            .set_contract_number("RB-1")
            .set_title("Works")
            .finalise("contract_1".into(), "user_owner", jan_1())
            .unwrap();
        assert_eq!(contract.status, ContractStatus::Draft);
        assert!(contract.change_status(ContractStatus::Completed).is_err());
        contract.change_status(ContractStatus::Active).unwrap();
        contract.change_status(ContractStatus::Terminated).unwrap();
        assert!(contract.change_status(ContractStatus::Active).is_err());
    }

    #[test]
    fn retention_and_damages_cap() {
        let contract = ContractDetails::new()
            .set_contract_number("RB-1")
            .set_title("Works")
            .set_accepted_amount(Money::from_major(1_000_000))
            .set_retention(500)
            .set_delay_damages(5, 1_000)
            .finalise("contract_1".into(), "user_owner", jan_1())
            .unwrap();
        assert_eq!(contract.retention_on(Money::from_major(20_000)), Ok(Money::from_major(1_000)));
        assert_eq!(contract.delay_damages_limit(), Ok(Money::from_major(100_000)));
        assert_eq!(Money(123_456).to_string(), "1234.56");
    }

    #[test]
    fn large_amounts_do_not_overflow() {
        let mut contract = ContractDetails::new()
            .set_contract_number("RB-2")
            .set_title("Works")
            .set_accepted_amount(Money(i64::MAX))
            .set_retention(500)
            .set_delay_damages(5, 10_000)
            .finalise("contract_2".into(), "user_owner", jan_1())
            .unwrap();
        assert_eq!(contract.retention_on(Money(i64::MAX)), Ok(Money(i64::MAX / 20)));
        assert_eq!(contract.delay_damages_limit(), Ok(Money(i64::MAX)));
        assert_eq!(Money::from_major(i32::MAX), Money(i64::from(i32::MAX) * 100));

        contract.retention = 20_000;
        assert_eq!(
            contract.retention_on(Money(i64::MAX)),
            Err(ValidationError::AmountOutOfRange("retention"))
        );
    }
}

// CLAIM MODULE TESTS
mod claim_tests {
    use super::*;

    fn filed() -> Claim {
        let notice = ClaimNotice::new("contract_1", "CL-1", ClaimantType::Contractor, "Late access");
        Claim::from_notice("claim_1".into(), notice, &contractor(), jan_1()).unwrap()
    }

    #[test]
    fn notice_fixes_due_date() {
        let claim = filed();
        assert_eq!(claim.notice_date, jan_1());
        assert_eq!(claim.detailed_claim_due_date, TimeStamp::new_with(2024, 3, 25, 0, 0, 0));
        assert_eq!(claim.submitted_by, "user_contractor");
        assert!(!claim.is_time_barred);
    }

    #[test]
    fn empty_claim_number_is_invalid() {
        let notice = ClaimNotice::new("contract_1", "", ClaimantType::Contractor, "Late access");
        let err = Claim::from_notice("claim_1".into(), notice, &contractor(), jan_1()).unwrap_err();
        assert!(matches!(err, EngineError::Validation(ValidationError::EmptyField("claim number"))));
    }

    #[test]
    fn pending_claim_time_bars() {
        let mut claim = filed();
        let late = TimeStamp::new_with(2024, 3, 26, 0, 0, 0);
        assert_eq!(claim.effective_status(late), ClaimStatus::TimeBarred);
        assert!(claim.mark_time_barred(late));
        assert!(claim.is_time_barred);
        assert!(!claim.mark_time_barred(late));
    }

    #[test]
    fn determination_outcome_must_be_a_decision() {
        let mut claim = filed();
        claim.submit_detailed_claim(None, None, &contractor(), jan_1()).unwrap();
        let err = claim
            .issue_determination(ClaimDetermination::new(ClaimStatus::Withdrawn), &engineer(), jan_1())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(claim.status, ClaimStatus::DetailedClaimSubmitted);
    }

    #[test]
    fn non_claimant_cannot_lodge_details() {
        let mut claim = filed();
        let other = Principal::new("user_other").with_role(Role::Contractor);
        let err = claim.submit_detailed_claim(None, None, &other, jan_1()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization);
    }

    #[test]
    fn withdrawal_passes_role_floor_then_ownership() {
        let filer = Principal::new("user_filer");
        assert!(role::authorize_action(&filer, Action::WithdrawClaim).is_ok());

        let notice = ClaimNotice::new("contract_1", "CL-2", ClaimantType::Employer, "Defects");
        let mut claim = Claim::from_notice("claim_2".into(), notice, &filer, jan_1()).unwrap();
        let err = claim.withdraw(&contractor(), jan_1()).unwrap_err();
        assert!(matches!(err, EngineError::NotOwner { action: Action::WithdrawClaim, .. }));
        assert_eq!(claim.status, ClaimStatus::NoticeSubmitted);

        claim.withdraw(&filer, jan_1()).unwrap();
        assert_eq!(claim.status, ClaimStatus::Withdrawn);
    }
}

// DOCUMENT MODULE TESTS
mod document_tests {
    use super::*;

    fn submitted() -> DocumentSubmission {
        let draft = DocumentDraft::new("contract_1", DocumentType::MaterialSubmittal, "MAT-9", "Waterproofing");
        DocumentSubmission::submit("doc_1".into(), draft, None, &contractor(), jan_1()).unwrap()
    }

    #[test]
    fn review_deadline_fixed_at_submission() {
        let doc = submitted();
        assert_eq!(doc.review_deadline, TimeStamp::new_with(2024, 1, 22, 0, 0, 0));
        assert_eq!(doc.revision_number, 1);
        assert_eq!(doc.parent_submission_id, None);
    }

    #[test]
    fn reviewer_cannot_choose_no_objection() {
        let mut doc = submitted();
        let err = doc
            .review(DocumentStatus::NoObjection, None, &engineer(), jan_1())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn revision_follows_parent() {
        let parent = submitted();
        let draft = DocumentDraft::new("contract_1", DocumentType::MaterialSubmittal, "MAT-9", "Waterproofing");
        let child = DocumentSubmission::submit("doc_2".into(), draft, Some(&parent), &contractor(), jan_1()).unwrap();
        assert_eq!(child.revision_number, 2);
        assert_eq!(child.parent_submission_id.as_deref(), Some("doc_1"));
    }

    #[test]
    fn mark_no_objection_only_after_deadline() {
        let mut doc = submitted();
        assert!(!doc.mark_no_objection(TimeStamp::new_with(2024, 1, 22, 0, 0, 0)));
        assert!(doc.mark_no_objection(TimeStamp::new_with(2024, 1, 22, 0, 0, 1)));
        assert_eq!(doc.status, DocumentStatus::NoObjection);
    }
}

// DISAGREEMENT MODULE TESTS
mod disagreement_tests {
    use super::*;

    fn raised() -> Disagreement {
        let draft = DisagreementDraft::new("contract_1", "DIS-1", "Measurement of earthworks");
        Disagreement::raise("dis_1".into(), draft, &contractor(), jan_1()).unwrap()
    }

    #[test]
    fn agreement_deadline_fixed_at_raising() {
        let dis = raised();
        assert_eq!(dis.agreement_deadline, TimeStamp::new_with(2024, 2, 12, 0, 0, 0));
        assert_eq!(dis.status, DisagreementStatus::Open);
    }

    #[test]
    fn determination_may_resolve_outright() {
        let mut dis = raised();
        dis.issue_determination("Measured per method of measurement", Some(DisagreementStatus::Resolved), &engineer(), jan_1())
            .unwrap();
        assert_eq!(dis.status, DisagreementStatus::Resolved);
    }

    #[test]
    fn determination_rejects_other_statuses_and_blank_text() {
        let mut dis = raised();
        let err = dis
            .issue_determination("text", Some(DisagreementStatus::AgreementReached), &engineer(), jan_1())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        let err = dis.issue_determination("   ", None, &engineer(), jan_1()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(dis.status, DisagreementStatus::Open);
    }
}

// ERROR MODULE TESTS
mod error_tests {
    use super::*;

    #[test]
    fn each_kind_has_its_own_message() {
        let errors = [
            EngineError::from(ValidationError::EmptyField("title")),
            EngineError::Authorization {
                action: Action::DetermineClaim,
                required: vec![Role::Engineer],
            },
            EngineError::invalid_state("claim_1", ClaimStatus::Approved, Action::DetermineClaim),
            EngineError::Conflict {
                record: "claim_1".into(),
            },
        ];
        let messages: std::collections::HashSet<_> = errors.iter().map(|e| e.user_message()).collect();
        assert_eq!(messages.len(), 4);
    }

    #[test]
    fn not_found_is_a_validation_error() {
        let err = EngineError::NotFound {
            table: "claims",
            id: "claim_x".into(),
        };
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
