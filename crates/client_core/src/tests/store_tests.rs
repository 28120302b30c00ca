use super::*;
use chrono::Utc;
use shared::domain::{DocumentId, DraftId, DraftType};

fn case(id: i64, name: &str) -> Case {
    Case {
        id: CaseId(id),
        name: name.to_string(),
        description: String::new(),
        created_at: Utc::now(),
        document_count: 0,
    }
}

fn document(id: i64, case_id: i64, status: DocumentStatus) -> Document {
    Document {
        id: DocumentId(id),
        case_id: CaseId(case_id),
        original_filename: format!("doc-{id}.pdf"),
        file_type: ".pdf".to_string(),
        category: None,
        status,
        page_count: None,
        created_at: Utc::now(),
        error_message: None,
    }
}

fn draft(id: i64, case_id: i64) -> Draft {
    Draft {
        id: DraftId(id),
        case_id: CaseId(case_id),
        draft_type: DraftType::Summary,
        title: "Summary".to_string(),
        content: "body".to_string(),
        created_at: Utc::now(),
    }
}

#[test]
fn activation_clears_previous_scoped_lists_and_bumps_the_epoch() {
    let mut store = EntityStore::new();
    store.replace_cases(vec![case(1, "Smith v. Johnson"), case(2, "Doe v. Acme")]);

    let epoch_a = store.activate(case(1, "Smith v. Johnson"));
    store
        .apply_documents(epoch_a, vec![document(10, 1, DocumentStatus::Pending)])
        .expect("apply");
    let drafts_applied = store.apply_drafts(epoch_a, vec![draft(100, 1)]);
    assert_eq!(drafts_applied, ApplyOutcome::Applied);

    let epoch_b = store.activate(case(2, "Doe v. Acme"));
    assert!(epoch_b > epoch_a);
    assert!(store.documents().is_empty());
    assert!(store.drafts().is_empty());
    assert_eq!(store.active_case_id(), Some(CaseId(2)));
}

#[test]
fn responses_tagged_with_an_old_epoch_are_discarded() {
    let mut store = EntityStore::new();
    let epoch_a = store.activate(case(1, "Smith v. Johnson"));
    store.activate(case(2, "Doe v. Acme"));

    let outcome = store
        .apply_documents(epoch_a, vec![document(10, 2, DocumentStatus::Pending)])
        .expect("stale is not an error");
    assert_eq!(outcome, ApplyOutcome::Stale);
    assert!(store.documents().is_empty());

    assert_eq!(
        store.apply_drafts(epoch_a, vec![draft(100, 2)]),
        ApplyOutcome::Stale
    );
    assert!(store.drafts().is_empty());
}

#[test]
fn responses_scoped_to_another_case_are_discarded() {
    let mut store = EntityStore::new();
    let epoch = store.activate(case(2, "Doe v. Acme"));

    let outcome = store
        .apply_documents(epoch, vec![document(10, 1, DocumentStatus::Pending)])
        .expect("dropped, not an error");
    assert_eq!(outcome, ApplyOutcome::Stale);
    assert!(store.documents().is_empty());
}

#[test]
fn responses_without_an_active_case_are_discarded() {
    let mut store = EntityStore::new();
    let epoch = store.activate(case(1, "Smith v. Johnson"));
    store.clear_active();

    let outcome = store
        .apply_documents(epoch, vec![document(10, 1, DocumentStatus::Pending)])
        .expect("dropped, not an error");
    assert_eq!(outcome, ApplyOutcome::Stale);
}

#[test]
fn status_regression_is_rejected_and_keeps_the_last_known_good_list() {
    let mut store = EntityStore::new();
    let epoch = store.activate(case(1, "Smith v. Johnson"));
    store
        .apply_documents(epoch, vec![document(10, 1, DocumentStatus::Completed)])
        .expect("apply");

    let err = store
        .apply_documents(epoch, vec![document(10, 1, DocumentStatus::Processing)])
        .expect_err("regression must be rejected");
    assert_eq!(err.document_id, 10);
    assert_eq!(err.from, DocumentStatus::Completed);
    assert_eq!(err.to, DocumentStatus::Processing);
    assert_eq!(store.documents()[0].status, DocumentStatus::Completed);
}

#[test]
fn forward_progress_replaces_the_document_list() {
    let mut store = EntityStore::new();
    let epoch = store.activate(case(1, "Smith v. Johnson"));
    store
        .apply_documents(
            epoch,
            vec![
                document(10, 1, DocumentStatus::Pending),
                document(11, 1, DocumentStatus::Pending),
            ],
        )
        .expect("apply");
    assert!(store.has_unsettled_documents());
    assert!(!store.has_completed_document());

    store
        .apply_documents(
            epoch,
            vec![
                document(10, 1, DocumentStatus::Completed),
                document(11, 1, DocumentStatus::Failed),
            ],
        )
        .expect("apply");
    assert!(!store.has_unsettled_documents());
    assert!(store.has_completed_document());
}

#[test]
fn replace_cases_refreshes_the_active_copy() {
    let mut store = EntityStore::new();
    store.replace_cases(vec![case(1, "Smith v. Johnson")]);
    store.activate(case(1, "Smith v. Johnson"));

    let mut updated = case(1, "Smith v. Johnson");
    updated.document_count = 4;
    store.replace_cases(vec![updated]);

    assert_eq!(store.active_case().map(|c| c.document_count), Some(4));
}
