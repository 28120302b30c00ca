use shared::{
    domain::{CaseId, DocumentStatus},
    protocol::{Case, Document, Draft},
};
use thiserror::Error;

/// In-memory snapshot of the selected case and its scoped lists. The store
/// is constructed once per client and only ever mutated from the client's
/// single logical thread; every mutation of the scoped lists goes through
/// an epoch check so a response fetched for a previous selection can never
/// overwrite the current one.
#[derive(Debug, Default)]
pub struct EntityStore {
    cases: Vec<Case>,
    active_case: Option<Case>,
    documents: Vec<Document>,
    drafts: Vec<Draft>,
    selection_epoch: u64,
}

/// Read-only copy handed to the renderer.
#[derive(Debug, Clone, Default)]
pub struct StoreSnapshot {
    pub cases: Vec<Case>,
    pub active_case: Option<Case>,
    pub documents: Vec<Document>,
    pub drafts: Vec<Draft>,
}

/// Result of applying a fetched list under the selection epoch check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// The selection moved on while the fetch was in flight; the response
    /// was dropped and the store is untouched.
    Stale,
}

/// The service reported a document moving backwards through the processing
/// pipeline. The offending snapshot is rejected wholesale and the store
/// keeps its last-known-good list.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("service reported document {document_id} moving {from:?} -> {to:?}; processing status never regresses")]
pub struct StatusRegression {
    pub document_id: i64,
    pub from: DocumentStatus,
    pub to: DocumentStatus,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selection_epoch(&self) -> u64 {
        self.selection_epoch
    }

    pub fn replace_cases(&mut self, cases: Vec<Case>) {
        self.cases = cases;
        // The active copy carries server-derived fields (document_count),
        // so refresh it from the new list when still present.
        if let Some(active) = &self.active_case {
            if let Some(refreshed) = self.cases.iter().find(|c| c.id == active.id) {
                self.active_case = Some(refreshed.clone());
            }
        }
    }

    pub fn cases(&self) -> &[Case] {
        &self.cases
    }

    pub fn case_by_id(&self, case_id: CaseId) -> Option<&Case> {
        self.cases.iter().find(|c| c.id == case_id)
    }

    /// Makes `case` the active selection. Bumps the selection epoch and
    /// drops the previous case's scoped lists; returns the new epoch for
    /// tagging the follow-up fetches.
    pub fn activate(&mut self, case: Case) -> u64 {
        self.selection_epoch += 1;
        self.active_case = Some(case);
        self.documents.clear();
        self.drafts.clear();
        self.selection_epoch
    }

    pub fn clear_active(&mut self) -> u64 {
        self.selection_epoch += 1;
        self.active_case = None;
        self.documents.clear();
        self.drafts.clear();
        self.selection_epoch
    }

    pub fn active_case(&self) -> Option<&Case> {
        self.active_case.as_ref()
    }

    pub fn active_case_id(&self) -> Option<CaseId> {
        self.active_case.as_ref().map(|c| c.id)
    }

    /// Replaces the document list with a snapshot fetched under `epoch`.
    /// Stale responses (older epoch, no active case, or rows scoped to a
    /// different case) are dropped; a snapshot containing a status
    /// regression for a known document is rejected as an upstream contract
    /// violation and leaves the list untouched.
    pub fn apply_documents(
        &mut self,
        epoch: u64,
        incoming: Vec<Document>,
    ) -> Result<ApplyOutcome, StatusRegression> {
        let Some(active) = &self.active_case else {
            return Ok(ApplyOutcome::Stale);
        };
        if epoch != self.selection_epoch
            || incoming.iter().any(|doc| doc.case_id != active.id)
        {
            return Ok(ApplyOutcome::Stale);
        }

        for doc in &incoming {
            if let Some(known) = self.documents.iter().find(|d| d.id == doc.id) {
                if known.status.regresses_to(doc.status) {
                    return Err(StatusRegression {
                        document_id: doc.id.0,
                        from: known.status,
                        to: doc.status,
                    });
                }
            }
        }

        self.documents = incoming;
        Ok(ApplyOutcome::Applied)
    }

    /// Replaces the draft list with a snapshot fetched under `epoch`.
    pub fn apply_drafts(&mut self, epoch: u64, incoming: Vec<Draft>) -> ApplyOutcome {
        let Some(active) = &self.active_case else {
            return ApplyOutcome::Stale;
        };
        if epoch != self.selection_epoch
            || incoming.iter().any(|draft| draft.case_id != active.id)
        {
            return ApplyOutcome::Stale;
        }
        self.drafts = incoming;
        ApplyOutcome::Applied
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn drafts(&self) -> &[Draft] {
        &self.drafts
    }

    /// True while any document still sits in a non-terminal status, i.e.
    /// while the reconciliation loop has work to do.
    pub fn has_unsettled_documents(&self) -> bool {
        self.documents.iter().any(|d| !d.status.is_terminal())
    }

    pub fn has_completed_document(&self) -> bool {
        self.documents
            .iter()
            .any(|d| d.status == DocumentStatus::Completed)
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            cases: self.cases.clone(),
            active_case: self.active_case.clone(),
            documents: self.documents.clone(),
            drafts: self.drafts.clone(),
        }
    }
}

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod tests;
