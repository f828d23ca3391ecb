//! Property-based tests for deadline derivation
//!
//! Every record type fixes its deadline at creation from the clock, and the
//! time-barred and no-objection outcomes are derived from that deadline alone.
//! These properties pin both down across arbitrary creation instants and
//! elapsed times, including the instant the deadline itself falls on.

use chrono::{DateTime, Utc};
use proptest::prelude::*;
use contract_admin::{
    claim::{Claim, ClaimNotice, ClaimStatus, ClaimantType},
    deadline::{self, TimeStamp},
    disagreement::{Disagreement, DisagreementDraft},
    document::{DocumentDraft, DocumentStatus, DocumentSubmission, DocumentType},
    role::{Principal, Role},
};

const DAY: i64 = 86_400;

fn contractor() -> Principal {
    Principal::new("user_contractor").with_role(Role::Contractor)
}

/// Instants between 2000 and 2100.
fn instant_strategy() -> impl Strategy<Value = TimeStamp> {
    (946_684_800i64..4_102_444_800i64)
        .prop_map(|secs| TimeStamp::from(DateTime::<Utc>::from_timestamp(secs, 0).unwrap()))
}

fn after(start: TimeStamp, days: i64, secs: i64) -> TimeStamp {
    let dt = start.to_datetime_utc() + chrono::Duration::seconds(days * DAY + secs);
    TimeStamp::from(dt)
}

fn claim_at(now: TimeStamp) -> Claim {
    let notice = ClaimNotice::new("contract_1", "CL-1", ClaimantType::Contractor, "Claim");
    Claim::from_notice("claim_1".into(), notice, &contractor(), now).unwrap()
}

fn document_at(now: TimeStamp) -> DocumentSubmission {
    let draft = DocumentDraft::new("contract_1", DocumentType::Programme, "PRG-1", "Programme");
    DocumentSubmission::submit("doc_1".into(), draft, None, &contractor(), now).unwrap()
}

fn pending_status_strategy() -> impl Strategy<Value = ClaimStatus> {
    prop_oneof![
        Just(ClaimStatus::NoticeSubmitted),
        Just(ClaimStatus::DetailedClaimPending),
    ]
}

proptest! {
    /// Property: detailed claim due date is exactly 84 days after the notice
    #[test]
    fn prop_claim_due_date_is_84_days(now in instant_strategy()) {
        let claim = claim_at(now);
        prop_assert_eq!(claim.detailed_claim_due_date, after(now, 84, 0));
        prop_assert_eq!(claim.days_remaining(now), 84);
    }

    /// Property: review deadline is exactly 21 days after submission
    #[test]
    fn prop_review_deadline_is_21_days(now in instant_strategy()) {
        let doc = document_at(now);
        prop_assert_eq!(doc.review_deadline, after(now, 21, 0));
        prop_assert_eq!(doc.days_remaining(now), 21);
    }

    /// Property: agreement deadline is exactly 42 days after raising
    #[test]
    fn prop_agreement_deadline_is_42_days(now in instant_strategy()) {
        let draft = DisagreementDraft::new("contract_1", "DIS-1", "Subject");
        let dis = Disagreement::raise("dis_1".into(), draft, &contractor(), now).unwrap();
        prop_assert_eq!(dis.agreement_deadline, after(now, 42, 0));
    }

    /// Property: a pending claim is time-barred exactly when the due date has passed
    #[test]
    fn prop_pending_claim_time_bars_after_due_date(
        start in instant_strategy(),
        status in pending_status_strategy(),
        days in 0i64..200,
        secs in 0i64..DAY,
    ) {
        let mut claim = claim_at(start);
        claim.status = status;
        let now = after(start, days, secs);
        let expired = now > claim.detailed_claim_due_date;

        prop_assert_eq!(claim.is_time_barred(now), expired);
        let expected = if expired { ClaimStatus::TimeBarred } else { status };
        prop_assert_eq!(claim.effective_status(now), expected);
    }

    /// Property: once a detailed claim is in, the claim never becomes time-barred
    #[test]
    fn prop_lodged_claim_never_time_bars(
        start in instant_strategy(),
        lodged_after in 0i64..84,
        days in 0i64..400,
    ) {
        let mut claim = claim_at(start);
        claim
            .submit_detailed_claim(None, None, &contractor(), after(start, lodged_after, 0))
            .unwrap();
        let now = after(start, days, 0);
        prop_assert!(!claim.is_time_barred(now));
        prop_assert_eq!(claim.effective_status(now), ClaimStatus::DetailedClaimSubmitted);
    }

    /// Property: an unreviewed document reads as no_objection exactly when its deadline passed
    #[test]
    fn prop_silence_becomes_no_objection(
        start in instant_strategy(),
        days in 0i64..60,
        secs in 0i64..DAY,
    ) {
        let doc = document_at(start);
        let now = after(start, days, secs);
        let expected = if now > doc.review_deadline {
            DocumentStatus::NoObjection
        } else {
            DocumentStatus::Submitted
        };
        prop_assert_eq!(doc.effective_status(now), expected);
        prop_assert_eq!(doc.status, DocumentStatus::Submitted);
    }

    /// Property: days_remaining agrees with add_days for any whole-day offset
    #[test]
    fn prop_days_remaining_inverts_add_days(start in instant_strategy(), n in 0u32..1_000) {
        let deadline = deadline::add_days(start, n).unwrap();
        prop_assert_eq!(deadline::days_remaining(deadline, start), i64::from(n));
        prop_assert_eq!(deadline::days_remaining(start, deadline), -i64::from(n));
    }
}
