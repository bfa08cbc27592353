use super::transport::GitLabClient;
use crate::error::Result;
use crate::gitlab::types::{Project, User};

/// Which slice of the instance's projects a listing covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectScope {
    /// Every project visible to the token (all projects for an administrator)
    All,
    /// Projects owned by the current user
    Owned,
    /// Projects the current user is a member of
    Membership,
}

impl ProjectScope {
    fn query(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Self::All => &[],
            Self::Owned => &[("owned", "true")],
            Self::Membership => &[("membership", "true")],
        }
    }
}

impl GitLabClient {
    /// `GET /user`
    pub async fn current_user(&self) -> Result<User> {
        let url = self.endpoint("user")?;
        self.get_json(url).await
    }

    /// `GET /projects`, restricted to `scope`, all pages.
    pub async fn list_projects(&self, scope: ProjectScope) -> Result<Vec<Project>> {
        let url = self.endpoint("projects")?;
        self.get_paginated(url, scope.query()).await
    }
}
