use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A generation request persisted at run start, before any other side effect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    /// Original user request text. Immutable after creation.
    pub prompt: String,
    pub name: String,
    pub description: String,
    pub status: ProjectStatus,
    /// Location of materialized files. Set only on success.
    pub output_path: Option<String>,
    /// Human-readable failure cause. Set only on failure.
    pub error: Option<String>,
    pub created_at: String,
}

/// Lifecycle status of a project run.
///
/// `Pending` exists only before the record is written; a persisted row starts
/// at `Generating`. `Completed` and `Failed` are terminal and absorbing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Pending,
    Generating,
    Completed,
    Failed,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Generating => "generating",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "generating" => Ok(Self::Generating),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid project status: {}", s)),
        }
    }
}

/// Validate that a status transition is allowed. Status only moves forward;
/// terminal states never transition again.
pub fn is_valid_transition(from: &ProjectStatus, to: &ProjectStatus) -> bool {
    matches!(
        (from, to),
        (ProjectStatus::Pending, ProjectStatus::Generating)
            | (ProjectStatus::Generating, ProjectStatus::Completed)
            | (ProjectStatus::Generating, ProjectStatus::Failed)
    )
}

/// A persisted file belonging to a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: i64,
    pub project_id: String,
    /// Project-relative path, traversal-free after sanitization.
    pub path: String,
    pub content: String,
    pub language: Option<String>,
    pub created_at: String,
}

/// The model's parsed output for one run. Transient: consumed once, then
/// decomposed into Project/File updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedProject {
    pub name: String,
    pub description: String,
    pub files: Vec<GeneratedFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedFile {
    pub path: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

// API view types

/// A project annotated with its file count, for listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSummary {
    #[serde(flatten)]
    pub project: Project,
    pub file_count: i64,
}

/// A project with its files, ordered by path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectDetail {
    #[serde(flatten)]
    pub project: Project,
    pub files: Vec<FileRecord>,
}

/// Payload of the "code-agent/run" trigger event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
    /// Raw user prompt. An empty or missing value is replaced with a default
    /// placeholder prompt rather than failing the run.
    #[serde(default)]
    pub value: String,
}

/// Event name consumed by the orchestrator.
pub const RUN_EVENT: &str = "code-agent/run";
