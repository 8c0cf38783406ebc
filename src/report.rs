//! Run report and its rendering.

use std::fmt::Write;

use serde::Serialize;
use vodcheck_common::{ContainerFormat, IssueKind, ManifestFormat, RenditionId, TrackKind, ValidationIssue};
use vodcheck_manifest::SkippedReference;

use crate::check::Observation;

/// Rendition as seen by the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenditionSummary {
    pub id: RenditionId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bandwidth: Option<u64>,
    pub track: TrackKind,
    pub container: ContainerFormat,
    /// Fragments declared by the manifest.
    pub declared_fragments: usize,
    /// Fragments selected for checking after sampling.
    pub checked_fragments: usize,
    pub encrypted: bool,
}

/// Everything a run found.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub manifest_url: String,
    pub format: ManifestFormat,
    pub renditions: Vec<RenditionSummary>,
    pub skipped_references: Vec<SkippedReference>,
    /// Fragments fetched and parsed, successfully or not.
    pub fragments_processed: usize,
    /// Fragments left unprocessed because the run was cancelled.
    pub fragments_skipped: usize,
    pub observations: Vec<Observation>,
    pub issues: Vec<ValidationIssue>,
    pub cancelled: bool,
}

impl Report {
    pub fn new(manifest_url: impl Into<String>, format: ManifestFormat) -> Self {
        Self {
            manifest_url: manifest_url.into(),
            format,
            renditions: Vec::new(),
            skipped_references: Vec::new(),
            fragments_processed: 0,
            fragments_skipped: 0,
            observations: Vec::new(),
            issues: Vec::new(),
            cancelled: false,
        }
    }

    pub fn has_issues(&self) -> bool {
        !self.issues.is_empty()
    }

    pub fn count(&self, kind: IssueKind) -> usize {
        self.issues.iter().filter(|i| i.kind == kind).count()
    }

    fn rendition_order(&self, id: Option<&RenditionId>) -> usize {
        id.and_then(|id| self.renditions.iter().position(|r| &r.id == id))
            .unwrap_or(usize::MAX)
    }

    /// Order issues by kind, then rendition position, segment and track.
    pub fn sort_issues(&mut self) {
        let mut keyed: Vec<_> = std::mem::take(&mut self.issues)
            .into_iter()
            .map(|issue| (self.rendition_order(issue.rendition.as_ref()), issue))
            .collect();
        keyed.sort_by(|(a_order, a), (b_order, b)| {
            (a.kind, *a_order, a.segment_index, a.track).cmp(&(
                b.kind,
                *b_order,
                b.segment_index,
                b.track,
            ))
        });
        self.issues = keyed.into_iter().map(|(_, issue)| issue).collect();
    }

    /// Human-readable summary.
    pub fn render_summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Manifest: {} ({})", self.manifest_url, self.format);
        let _ = writeln!(out, "Renditions: {}", self.renditions.len());
        for r in &self.renditions {
            let _ = writeln!(
                out,
                "  {} {} {} fragments {}/{}{}",
                r.id,
                r.track,
                r.container,
                r.checked_fragments,
                r.declared_fragments,
                if r.encrypted { " (encrypted)" } else { "" }
            );
        }
        for skipped in &self.skipped_references {
            let _ = writeln!(out, "Skipped: {} ({})", skipped.url, skipped.reason);
        }
        let _ = writeln!(out, "Fragments processed: {}", self.fragments_processed);
        if self.cancelled {
            let _ = writeln!(
                out,
                "Run cancelled, {} fragments not processed",
                self.fragments_skipped
            );
        }

        if self.issues.is_empty() {
            let _ = writeln!(out, "No issues found");
            return out;
        }
        let _ = writeln!(out, "Issues: {}", self.issues.len());
        for kind in [
            IssueKind::DecodeFailure,
            IssueKind::ContinuityError,
            IssueKind::InStreamGap,
            IssueKind::CrossStreamGap,
            IssueKind::KeyframeMismatch,
        ] {
            let n = self.count(kind);
            if n > 0 {
                let _ = writeln!(out, "  {}: {}", kind, n);
            }
        }
        for issue in &self.issues {
            let _ = writeln!(out, "{}", issue);
        }
        out
    }
}
