use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub i64);
    };
}

id_newtype!(CaseId);
id_newtype!(DocumentId);
id_newtype!(DraftId);

/// Server-side processing state of an uploaded document. The service only
/// ever moves a document forward: `pending -> processing -> completed`, or
/// from either non-terminal state to `failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl DocumentStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Processing => 1,
            Self::Completed | Self::Failed => 2,
        }
    }

    /// True when observing `next` after `self` would mean the service moved
    /// a document backwards, which the processing contract forbids.
    pub fn regresses_to(self, next: Self) -> bool {
        if self.is_terminal() {
            return next != self;
        }
        next.rank() < self.rank()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftType {
    Summary,
    Checklist,
    CoverLetter,
}

impl DraftType {
    /// Human-readable label used in renderer notifications.
    pub fn label(self) -> &'static str {
        match self {
            Self::Summary => "summary",
            Self::Checklist => "checklist",
            Self::CoverLetter => "cover letter",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_transitions_are_not_regressions() {
        use DocumentStatus::*;
        assert!(!Pending.regresses_to(Processing));
        assert!(!Pending.regresses_to(Completed));
        assert!(!Pending.regresses_to(Failed));
        assert!(!Processing.regresses_to(Completed));
        assert!(!Processing.regresses_to(Failed));
        assert!(!Completed.regresses_to(Completed));
    }

    #[test]
    fn backward_transitions_are_regressions() {
        use DocumentStatus::*;
        assert!(Processing.regresses_to(Pending));
        assert!(Completed.regresses_to(Processing));
        assert!(Completed.regresses_to(Pending));
        assert!(Failed.regresses_to(Completed));
        assert!(Completed.regresses_to(Failed));
    }

    #[test]
    fn terminal_states() {
        assert!(DocumentStatus::Completed.is_terminal());
        assert!(DocumentStatus::Failed.is_terminal());
        assert!(!DocumentStatus::Pending.is_terminal());
        assert!(!DocumentStatus::Processing.is_terminal());
    }
}
