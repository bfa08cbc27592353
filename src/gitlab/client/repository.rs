use super::transport::GitLabClient;
use crate::error::Result;
use crate::gitlab::types::Branch;

impl GitLabClient {
    /// `GET /projects/:id/repository/branches`, all pages.
    ///
    /// `project` is either the numeric id or the full `group/project` path.
    /// An unknown project fails with `NotFound`.
    pub async fn list_branches(&self, project: &str) -> Result<Vec<Branch>> {
        let url = self.project_url(project, "repository/branches")?;
        self.get_paginated(url, &[]).await
    }

    /// First page only, at most `limit` branches.
    pub async fn first_branches(&self, project: &str, limit: usize) -> Result<Vec<Branch>> {
        let url = self.project_url(project, "repository/branches")?;
        let per_page = limit.clamp(1, 100).to_string();

        let response = self
            .execute(|| {
                self.http()
                    .get(url.clone())
                    .query(&[("per_page", per_page.as_str()), ("page", "1")])
            })
            .await?;
        Ok(response.json().await?)
    }
}
