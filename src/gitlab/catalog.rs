use log::debug;

use super::client::{GitLabClient, HookSettings, ProjectScope};
use super::types::{Branch, HookEvents, Project, ProjectHook};
use crate::error::Result;

/// Why a project listing is requested.
///
/// Non-administrators see different project sets depending on the caller:
/// webhook reconciliation only touches projects the account owns, while the
/// job list exposes every project the account is a member of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingContext {
    Reconciliation,
    JobListing,
}

impl ListingContext {
    fn non_admin_scope(self) -> ProjectScope {
        match self {
            Self::Reconciliation => ProjectScope::Owned,
            Self::JobListing => ProjectScope::Membership,
        }
    }
}

/// Read/write access to the projects, branches and hooks visible to the bridge.
///
/// Borrows the client for the duration of each call; it never owns a connection.
pub struct ProjectCatalog<'a> {
    client: &'a GitLabClient,
}

impl<'a> ProjectCatalog<'a> {
    pub fn new(client: &'a GitLabClient) -> Self {
        Self { client }
    }

    pub async fn is_current_user_admin(&self) -> Result<bool> {
        let user = self.client.current_user().await?;
        debug!("Authenticated as {} (admin: {})", user.username, user.is_admin());

        Ok(user.is_admin())
    }

    /// Lists the projects in scope for `context`.
    ///
    /// Administrators always get the whole instance.
    ///
    /// # Errors
    ///
    /// Fails if the current user or any page of the project list cannot be fetched.
    pub async fn list_visible_projects(&self, context: ListingContext) -> Result<Vec<Project>> {
        let scope = if self.is_current_user_admin().await? {
            ProjectScope::All
        } else {
            context.non_admin_scope()
        };
        debug!("Listing projects for {context:?} with scope {scope:?}");

        self.client.list_projects(scope).await
    }

    pub async fn list_branches(&self, project_path: &str) -> Result<Vec<Branch>> {
        self.client.list_branches(project_path).await
    }

    /// Whether the project has more than one branch, from a single two-item page.
    pub async fn has_multiple_branches(&self, project_id: u64) -> Result<bool> {
        let sample = self.client.first_branches(&project_id.to_string(), 2).await?;
        Ok(sample.len() > 1)
    }

    pub async fn list_hooks(&self, project_id: u64) -> Result<Vec<ProjectHook>> {
        self.client.list_hooks(project_id).await
    }

    pub async fn add_hook(
        &self,
        project_id: u64,
        url: &str,
        events: HookEvents,
        settings: &HookSettings,
    ) -> Result<ProjectHook> {
        self.client.add_hook(project_id, url, events, settings).await
    }

    pub async fn delete_hook(&self, project_id: u64, hook_id: u64) -> Result<()> {
        self.client.delete_hook(project_id, hook_id).await
    }
}
