use log::debug;

use super::transport::GitLabClient;
use crate::error::Result;
use crate::gitlab::types::{HookEvents, NewHook, ProjectHook};

/// Delivery settings applied to every hook the bridge creates.
#[derive(Debug, Clone, Default)]
pub struct HookSettings {
    /// Sent back by GitLab in `X-Gitlab-Token` on each delivery
    pub secret_token: Option<String>,
    pub enable_ssl_verification: bool,
}

impl GitLabClient {
    /// `GET /projects/:id/hooks`, all pages.
    pub async fn list_hooks(&self, project_id: u64) -> Result<Vec<ProjectHook>> {
        let url = self.project_url(&project_id.to_string(), "hooks")?;
        self.get_paginated(url, &[]).await
    }

    /// `POST /projects/:id/hooks`
    ///
    /// Not replayed after a timeout or a server error, so a failure here does not
    /// prove the hook was not stored.
    pub async fn add_hook(
        &self,
        project_id: u64,
        hook_url: &str,
        events: HookEvents,
        settings: &HookSettings,
    ) -> Result<ProjectHook> {
        let url = self.project_url(&project_id.to_string(), "hooks")?;
        let body = NewHook {
            url: hook_url,
            job_events: events.job_events,
            pipeline_events: events.pipeline_events,
            push_events: false,
            enable_ssl_verification: settings.enable_ssl_verification,
            token: settings.secret_token.as_deref(),
        };

        let response = self
            .execute_once(|| self.http().post(url.clone()).json(&body))
            .await?;
        let hook: ProjectHook = response.json().await?;
        debug!("Created hook {} on project {project_id}", hook.id);

        Ok(hook)
    }

    /// `DELETE /projects/:id/hooks/:hook_id`
    pub async fn delete_hook(&self, project_id: u64, hook_id: u64) -> Result<()> {
        let url = self.project_url(&project_id.to_string(), &format!("hooks/{hook_id}"))?;
        self.execute(|| self.http().delete(url.clone())).await?;
        debug!("Deleted hook {hook_id} on project {project_id}");

        Ok(())
    }
}
