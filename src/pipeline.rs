use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Prefix that marks a project-level aggregate job id (`pipeline:group/project`).
pub const PIPELINE_PREFIX: &str = "pipeline:";

/// Multi-branch classification of a pipeline node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MultiBranchType {
    #[default]
    None,
    /// Aggregate over several branch-level pipelines, not buildable itself
    MultiBranchParent,
}

/// A job as seen by the downstream CI consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineNode {
    /// `pipeline:<project-path>` or `<identifier>/<branch>`
    pub job_ci_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub multi_branch_type: MultiBranchType,
}

impl PipelineNode {
    pub fn new(job_ci_id: impl Into<String>) -> Self {
        Self {
            job_ci_id: job_ci_id.into(),
            name: None,
            multi_branch_type: MultiBranchType::None,
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_multi_branch_type(mut self, multi_branch_type: MultiBranchType) -> Self {
        self.multi_branch_type = multi_branch_type;
        self
    }

    pub fn is_multi_branch_parent(&self) -> bool {
        self.multi_branch_type == MultiBranchType::MultiBranchParent
    }
}

/// Snapshot of every job visible to the bridge. Always computed fresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobList {
    pub collected_at: DateTime<Utc>,
    pub jobs: Vec<PipelineNode>,
}

impl JobList {
    pub fn new(jobs: Vec<PipelineNode>) -> Self {
        Self {
            collected_at: Utc::now(),
            jobs,
        }
    }
}

/// Aggregate job id for a project path.
pub fn pipeline_job_id(project_path: &str) -> String {
    format!("{PIPELINE_PREFIX}{project_path}")
}

/// Strips the aggregate prefix, leaving the bare project path.
///
/// Identifiers without the prefix are returned unchanged.
pub fn cut_pipeline_prefix(identifier: &str) -> &str {
    identifier
        .strip_prefix(PIPELINE_PREFIX)
        .unwrap_or(identifier)
}

/// Display name for a job id: the project path it points at, whitespace trimmed.
pub fn pipeline_display_name(identifier: &str) -> String {
    cut_pipeline_prefix(identifier.trim()).to_string()
}
