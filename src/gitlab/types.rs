use serde::{Deserialize, Serialize};

/// A GitLab project as returned by the REST API.
///
/// Only the fields the bridge relies on are deserialized; GitLab sends many more.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Project {
    /// Instance-wide numeric identifier
    pub id: u64,
    /// Full path including namespace (e.g., "group/project"), unique per instance
    pub path_with_namespace: String,
}

/// A repository branch.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Branch {
    pub name: String,
}

/// A webhook registered on a single project.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProjectHook {
    pub id: u64,
    pub url: String,
    #[serde(default)]
    pub job_events: bool,
    #[serde(default)]
    pub pipeline_events: bool,
}

/// The authenticated user.
#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub username: String,
    /// Only present when the caller may see it; absent means not an administrator
    #[serde(default)]
    pub is_admin: Option<bool>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.is_admin.unwrap_or(false)
    }
}

/// Event classes a webhook subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HookEvents {
    pub job_events: bool,
    pub pipeline_events: bool,
}

impl HookEvents {
    /// Job and pipeline events, nothing else.
    pub const JOB_AND_PIPELINE: Self = Self {
        job_events: true,
        pipeline_events: true,
    };
}

/// Request body for `POST /projects/:id/hooks`.
#[derive(Debug, Serialize)]
pub(crate) struct NewHook<'a> {
    pub url: &'a str,
    pub job_events: bool,
    pub pipeline_events: bool,
    pub push_events: bool,
    pub enable_ssl_verification: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<&'a str>,
}
