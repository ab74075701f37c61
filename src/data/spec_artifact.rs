use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of specification document produced by the spec stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpecKind {
    HumanReadable,
    OpenApiYaml,
    Unified,
}

impl SpecKind {
    /// Well-known file holding the current document of this kind.
    pub fn file_name(self) -> &'static str {
        match self {
            SpecKind::HumanReadable => "Human_Readable_API_Spec.md",
            SpecKind::OpenApiYaml => "OpenAPI_YAML_Spec.md",
            SpecKind::Unified => "Unified_API_Spec.md",
        }
    }

    pub fn slug(self) -> &'static str {
        match self {
            SpecKind::HumanReadable => "human_readable",
            SpecKind::OpenApiYaml => "openapi_yaml",
            SpecKind::Unified => "api_spec",
        }
    }
}

/// One revision of a specification document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecArtifact {
    pub kind: SpecKind,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub approved: bool,
}

impl SpecArtifact {
    pub fn new(kind: SpecKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
            created_at: Utc::now(),
            approved: false,
        }
    }
}

/// Ordered revisions of the unified spec for one run.
///
/// Edits append, they never mutate an earlier revision. Only the last
/// revision is current and only the current revision can be approved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpecLineage {
    revisions: Vec<SpecArtifact>,
}

impl SpecLineage {
    /// Starts a new lineage from a freshly merged spec.
    pub fn start(content: impl Into<String>) -> Self {
        Self {
            revisions: vec![SpecArtifact::new(SpecKind::Unified, content)],
        }
    }

    pub fn current(&self) -> Option<&SpecArtifact> {
        self.revisions.last()
    }

    pub fn revisions(&self) -> &[SpecArtifact] {
        &self.revisions
    }

    pub fn is_empty(&self) -> bool {
        self.revisions.is_empty()
    }

    pub fn is_approved(&self) -> bool {
        self.current().map(|rev| rev.approved).unwrap_or(false)
    }

    /// Appends a revision. Returns `None` if the lineage is already approved.
    pub fn revise(&mut self, content: impl Into<String>) -> Option<&SpecArtifact> {
        if self.is_approved() {
            return None;
        }
        self.revisions
            .push(SpecArtifact::new(SpecKind::Unified, content));
        self.revisions.last()
    }

    /// Marks the current revision approved. Returns false when there is
    /// nothing to approve.
    pub fn approve(&mut self) -> bool {
        match self.revisions.last_mut() {
            Some(rev) => {
                rev.approved = true;
                true
            }
            None => false,
        }
    }
}
