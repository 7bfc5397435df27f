//! Remediation and needs-attention derivation
//!
//! Read-only, advisory rule engine: it inspects a snapshot of project
//! state fetched by the caller and derives a prioritized worklist. It is
//! recomputed on every request and never persisted or mutated: tasks are
//! suggestions, not automatic actions.

use serde::Serialize;
use uuid::Uuid;

use crate::services::lifecycle::{project_status, ProjectRdmpStatus, RdmpStatus};

/// Missing-field count at which incomplete samples are surfaced as the
/// higher-severity group. A UI convention, not a business rule derived
/// from RDMP content.
pub const MISSING_FIELDS_SEVERE_THRESHOLD: usize = 3;

/// Cap on project ids carried per needs-attention item
const MAX_ENTITY_IDS: usize = 10;

/// Priority of a derived remediation task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Urgent,
    Recommended,
}

/// A derived, never-persisted suggested corrective action
#[derive(Debug, Clone, Serialize)]
pub struct RemediationTask {
    /// Stable machine-readable rule identifier
    pub code: &'static str,
    pub priority: TaskPriority,
    pub reason: String,
    pub impact: String,
    pub steps: String,
    /// Suggested UI route for the corrective action
    pub action_route: String,
}

/// Per-project remediation worklist
#[derive(Debug, Clone, Serialize)]
pub struct RemediationReport {
    pub tasks: Vec<RemediationTask>,
    /// Explicit terminal state: nothing fired, the project is in order
    pub well_organized: bool,
}

/// One sample's completeness against the active RDMP
#[derive(Debug, Clone)]
pub struct SampleCompleteness {
    pub sample_identifier: String,
    pub missing_required_fields: Vec<String>,
}

/// Snapshot of one project's governance-relevant state
#[derive(Debug, Clone, Default)]
pub struct ProjectSnapshot {
    pub project_id: Uuid,
    pub rdmp_statuses: Vec<RdmpStatus>,
    pub storage_root_count: usize,
    pub pending_ingest_count: usize,
    pub incomplete_samples: Vec<SampleCompleteness>,
    pub orphaned_raw_data_count: usize,
}

/// Derive the remediation worklist for one project.
///
/// Rules fire independently; output order is priority-significant within
/// urgent, then recommended.
pub fn derive_project_tasks(snapshot: &ProjectSnapshot) -> RemediationReport {
    let mut tasks = Vec::new();
    let status = project_status(&snapshot.rdmp_statuses);
    let pid = snapshot.project_id;

    // Rule 1: no active RDMP blocks all ingestion
    if status != ProjectRdmpStatus::Active {
        let has_draft = snapshot
            .rdmp_statuses
            .iter()
            .any(|s| *s == RdmpStatus::Draft);
        let (reason, steps) = if has_draft {
            (
                "This project has a draft RDMP but none is active".to_string(),
                "Ask a PI to review and activate the draft RDMP".to_string(),
            )
        } else {
            (
                "This project has no active RDMP".to_string(),
                "Create an RDMP draft defining the project's required metadata fields".to_string(),
            )
        };
        tasks.push(RemediationTask {
            code: "no_active_rdmp",
            priority: TaskPriority::Urgent,
            reason,
            impact: "Data ingestion is disabled until an RDMP is activated".to_string(),
            steps,
            action_route: format!("/projects/{}/rdmps", pid),
        });
    }

    // Rule 2: active governance but nowhere to ingest from
    if status == ProjectRdmpStatus::Active && snapshot.storage_root_count == 0 {
        tasks.push(RemediationTask {
            code: "no_storage_roots",
            priority: TaskPriority::Urgent,
            reason: "An RDMP is active but no storage roots are configured".to_string(),
            impact: "Detected files have no ingest source to arrive through".to_string(),
            steps: "Add a storage root pointing at the instrument or share to watch".to_string(),
            action_route: format!("/projects/{}/storage", pid),
        });
    }

    // Rule 3: unresolved inbox
    if snapshot.pending_ingest_count > 0 {
        let n = snapshot.pending_ingest_count;
        let reason = if n == 1 {
            "1 detected file is waiting to be linked to a sample".to_string()
        } else {
            format!("{} detected files are waiting to be linked to samples", n)
        };
        tasks.push(RemediationTask {
            code: "pending_ingests",
            priority: TaskPriority::Recommended,
            reason,
            impact: "Unresolved files are not yet traceable to samples".to_string(),
            steps: "Review the ingest inbox and finalize or cancel each entry".to_string(),
            action_route: format!("/projects/{}/ingest", pid),
        });
    }

    // Rule 4: metadata completeness, severity split at the configured
    // threshold; only the higher-severity group is surfaced so the same
    // underlying cause does not produce two tasks at once
    if !snapshot.incomplete_samples.is_empty() {
        let severe: Vec<&SampleCompleteness> = snapshot
            .incomplete_samples
            .iter()
            .filter(|s| s.missing_required_fields.len() >= MISSING_FIELDS_SEVERE_THRESHOLD)
            .collect();

        let reason = if !severe.is_empty() {
            format!(
                "{} sample(s) are missing {} or more required metadata fields",
                severe.len(),
                MISSING_FIELDS_SEVERE_THRESHOLD
            )
        } else {
            format!(
                "{} sample(s) are missing required metadata fields",
                snapshot.incomplete_samples.len()
            )
        };

        tasks.push(RemediationTask {
            code: "incomplete_samples",
            priority: TaskPriority::Recommended,
            reason,
            impact: "Samples without required metadata cannot be interpreted or shared".to_string(),
            steps: "Fill in the missing field values on each sample".to_string(),
            action_route: format!("/projects/{}/samples", pid),
        });
    }

    // Rule 5: orphaned raw data
    if snapshot.orphaned_raw_data_count > 0 {
        tasks.push(RemediationTask {
            code: "orphaned_raw_data",
            priority: TaskPriority::Recommended,
            reason: format!(
                "{} raw data item(s) are not linked to any sample",
                snapshot.orphaned_raw_data_count
            ),
            impact: "Orphaned data cannot be traced back to a sample".to_string(),
            steps: "Link each orphaned item to the sample it belongs to".to_string(),
            action_route: format!("/projects/{}/data", pid),
        });
    }

    tasks.sort_by_key(|t| match t.priority {
        TaskPriority::Urgent => 0,
        TaskPriority::Recommended => 1,
    });

    let well_organized = tasks.is_empty();
    RemediationReport {
        tasks,
        well_organized,
    }
}

/// Severity of a lab-level needs-attention condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    High,
    Warning,
    Info,
}

/// One cross-project condition requiring Steward/PI attention
#[derive(Debug, Clone, Serialize)]
pub struct NeedsAttentionItem {
    pub item_type: &'static str,
    pub severity: Severity,
    pub count: usize,
    pub project_ids: Vec<Uuid>,
    pub message: String,
    /// Deep-link target for the condition
    pub link: String,
}

/// Snapshot of one project as seen by the lab aggregator
#[derive(Debug, Clone)]
pub struct LabProjectSnapshot {
    pub project_id: Uuid,
    pub is_active: bool,
    pub rdmp_statuses: Vec<RdmpStatus>,
}

/// Snapshot of a lab's governance-relevant state
#[derive(Debug, Clone)]
pub struct LabSnapshot {
    pub lab_id: Uuid,
    pub projects: Vec<LabProjectSnapshot>,
    /// Whether the roster contains at least one STEWARD or PI member
    pub has_steward_or_pi: bool,
}

/// Project counts by mutually exclusive RDMP category
#[derive(Debug, Clone, Default, Serialize)]
pub struct RdmpCategoryCounts {
    pub active: usize,
    pub draft: usize,
    pub superseded: usize,
    pub no_rdmp: usize,
}

/// Lab-level status summary
#[derive(Debug, Clone, Serialize)]
pub struct LabStatusSummary {
    pub total_projects: usize,
    pub operational_projects: usize,
    pub by_rdmp_status: RdmpCategoryCounts,
    pub needs_attention: Vec<NeedsAttentionItem>,
}

/// Derive the cross-project needs-attention summary for a lab.
pub fn derive_lab_status(snapshot: &LabSnapshot) -> LabStatusSummary {
    let mut counts = RdmpCategoryCounts::default();
    for p in &snapshot.projects {
        match project_status(&p.rdmp_statuses) {
            ProjectRdmpStatus::Active => counts.active += 1,
            ProjectRdmpStatus::Draft => counts.draft += 1,
            ProjectRdmpStatus::Superseded => counts.superseded += 1,
            ProjectRdmpStatus::None => counts.no_rdmp += 1,
        }
    }

    let mut needs_attention = Vec::new();

    // Operational project without active RDMP: a consistency violation,
    // since data capture should not be happening there
    let op_without_active: Vec<Uuid> = snapshot
        .projects
        .iter()
        .filter(|p| p.is_active && project_status(&p.rdmp_statuses) != ProjectRdmpStatus::Active)
        .map(|p| p.project_id)
        .collect();
    if !op_without_active.is_empty() {
        needs_attention.push(NeedsAttentionItem {
            item_type: "project_operational_without_active_rdmp",
            severity: Severity::High,
            count: op_without_active.len(),
            message: format!(
                "{} operational project(s) lack an active RDMP",
                op_without_active.len()
            ),
            link: format!("/labs/{}/projects?filter=no-active-rdmp", snapshot.lab_id),
            project_ids: op_without_active.into_iter().take(MAX_ENTITY_IDS).collect(),
        });
    }

    // Only superseded RDMPs: governance lapsed and was never renewed
    let superseded_only: Vec<Uuid> = snapshot
        .projects
        .iter()
        .filter(|p| project_status(&p.rdmp_statuses) == ProjectRdmpStatus::Superseded)
        .map(|p| p.project_id)
        .collect();
    if !superseded_only.is_empty() {
        needs_attention.push(NeedsAttentionItem {
            item_type: "project_with_superseded_rdmp",
            severity: Severity::Warning,
            count: superseded_only.len(),
            message: format!(
                "{} project(s) have only superseded RDMPs",
                superseded_only.len()
            ),
            link: format!("/labs/{}/projects?filter=superseded", snapshot.lab_id),
            project_ids: superseded_only.into_iter().take(MAX_ENTITY_IDS).collect(),
        });
    }

    // No RDMP at all
    let no_rdmp: Vec<Uuid> = snapshot
        .projects
        .iter()
        .filter(|p| p.rdmp_statuses.is_empty())
        .map(|p| p.project_id)
        .collect();
    if !no_rdmp.is_empty() {
        needs_attention.push(NeedsAttentionItem {
            item_type: "project_without_rdmp",
            severity: Severity::Info,
            count: no_rdmp.len(),
            message: format!("{} project(s) have no RDMP", no_rdmp.len()),
            link: format!("/labs/{}/projects?filter=no-rdmp", snapshot.lab_id),
            project_ids: no_rdmp.into_iter().take(MAX_ENTITY_IDS).collect(),
        });
    }

    // Governance gap: nobody in the roster can steward or approve
    if !snapshot.has_steward_or_pi {
        needs_attention.push(NeedsAttentionItem {
            item_type: "lab_without_steward_or_pi",
            severity: Severity::Warning,
            count: 1,
            project_ids: Vec::new(),
            message: "This lab has no STEWARD or PI member; RDMPs cannot be managed or activated"
                .to_string(),
            link: format!("/labs/{}/members", snapshot.lab_id),
        });
    }

    LabStatusSummary {
        total_projects: snapshot.projects.len(),
        operational_projects: snapshot.projects.iter().filter(|p| p.is_active).count(),
        by_rdmp_status: counts,
        needs_attention,
    }
}
