use std::fmt;

use log::{debug, info, warn};
use url::Url;

use crate::error::{BridgeError, Result};
use crate::gitlab::{HookEvents, HookSettings, ListingContext, Project, ProjectCatalog};

/// Which half of the reconciliation protocol a pass runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Remove stale hooks, then create exactly one
    Install,
    /// Remove hooks only
    Teardown,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Install => f.write_str("install"),
            Self::Teardown => f.write_str("teardown"),
        }
    }
}

/// A non-fatal failure recorded while reconciling one project.
#[derive(Debug)]
pub struct ProjectFailure {
    pub project: String,
    pub error: BridgeError,
}

/// Outcome of one reconciliation pass.
///
/// Per-project failures accumulate in `failures` and never stop the pass;
/// `aborted` is set only when the project set itself could not be listed.
#[derive(Debug)]
pub struct ReconcileReport {
    pub phase: Phase,
    pub projects: usize,
    pub hooks_deleted: usize,
    /// Matching hooks that were gone by the time they were deleted
    pub hooks_already_gone: usize,
    pub hooks_created: usize,
    pub failures: Vec<ProjectFailure>,
    pub aborted: Option<BridgeError>,
}

impl ReconcileReport {
    fn new(phase: Phase) -> Self {
        Self {
            phase,
            projects: 0,
            hooks_deleted: 0,
            hooks_already_gone: 0,
            hooks_created: 0,
            failures: Vec::new(),
            aborted: None,
        }
    }

    fn record(&mut self, project: &Project, error: BridgeError) {
        self.failures.push(ProjectFailure {
            project: project.path_with_namespace.clone(),
            error,
        });
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.aborted.is_none()
    }
}

/// Keeps exactly one bridge webhook on every owned (or, for admins, every) project.
pub struct WebhookReconciler<'a> {
    catalog: ProjectCatalog<'a>,
    callback_url: &'a Url,
    settings: &'a HookSettings,
}

impl<'a> WebhookReconciler<'a> {
    pub fn new(
        catalog: ProjectCatalog<'a>,
        callback_url: &'a Url,
        settings: &'a HookSettings,
    ) -> Self {
        Self {
            catalog,
            callback_url,
            settings,
        }
    }

    /// Replaces every hook pointing at the callback URL with a single fresh one.
    pub async fn install(&self) -> ReconcileReport {
        self.run(Phase::Install).await
    }

    /// Removes every hook pointing at the callback URL.
    pub async fn teardown(&self) -> ReconcileReport {
        self.run(Phase::Teardown).await
    }

    async fn run(&self, phase: Phase) -> ReconcileReport {
        let mut report = ReconcileReport::new(phase);

        let projects = match self
            .catalog
            .list_visible_projects(ListingContext::Reconciliation)
            .await
        {
            Ok(projects) => projects,
            Err(e) => {
                warn!("Failed to list GitLab projects, skipping webhook {phase}: {e}");
                report.aborted = Some(e);
                return report;
            }
        };

        info!(
            "Running webhook {phase} for {} on {} projects",
            self.callback_url,
            projects.len()
        );

        for project in &projects {
            report.projects += 1;
            self.reconcile_project(project, phase, &mut report).await;
        }

        info!(
            "Webhook {phase} finished: {} deleted, {} created, {} failures",
            report.hooks_deleted,
            report.hooks_created,
            report.failures.len()
        );

        report
    }

    async fn reconcile_project(&self, project: &Project, phase: Phase, report: &mut ReconcileReport) {
        let path = &project.path_with_namespace;

        let cleared = match self.delete_matching_hooks(project, report).await {
            Ok(cleared) => cleared,
            Err(e) => {
                warn!("Failed to list web hooks of {path}: {e}");
                report.record(project, e);
                return;
            }
        };

        if phase == Phase::Teardown {
            return;
        }

        // A surviving stale hook plus a new one would mean duplicate deliveries.
        if !cleared {
            warn!("Not creating a web hook on {path}: a stale one could not be removed");
            return;
        }

        match self
            .catalog
            .add_hook(
                project.id,
                self.callback_url.as_str(),
                HookEvents::JOB_AND_PIPELINE,
                self.settings,
            )
            .await
        {
            Ok(hook) => {
                debug!("Created web hook {} on {path}", hook.id);
                report.hooks_created += 1;
            }
            Err(e) => match self.find_callback_hook(project).await {
                Some(hook_id) => {
                    warn!("Creating a web hook on {path} failed ({e}), but hook {hook_id} is in place");
                    report.hooks_created += 1;
                }
                None => {
                    warn!("Failed to create a web hook on {path}: {e}");
                    report.record(project, e);
                }
            },
        }
    }

    /// Id of a hook on `project` targeting the callback URL, if one can be seen.
    async fn find_callback_hook(&self, project: &Project) -> Option<u64> {
        match self.catalog.list_hooks(project.id).await {
            Ok(hooks) => hooks
                .into_iter()
                .find(|hook| hook.url == self.callback_url.as_str())
                .map(|hook| hook.id),
            Err(e) => {
                debug!(
                    "Could not re-read web hooks of {}: {e}",
                    project.path_with_namespace
                );
                None
            }
        }
    }

    /// Deletes every hook on `project` targeting the callback URL.
    ///
    /// A hook that is already gone counts as removed. Returns `Ok(false)` when
    /// at least one of them could not be deleted.
    async fn delete_matching_hooks(
        &self,
        project: &Project,
        report: &mut ReconcileReport,
    ) -> Result<bool> {
        let hooks = self.catalog.list_hooks(project.id).await?;
        let mut cleared = true;

        for hook in hooks
            .iter()
            .filter(|hook| hook.url == self.callback_url.as_str())
        {
            debug!(
                "Deleting web hook {} on {} (job events: {}, pipeline events: {})",
                hook.id, project.path_with_namespace, hook.job_events, hook.pipeline_events
            );
            match self.catalog.delete_hook(project.id, hook.id).await {
                Ok(()) => report.hooks_deleted += 1,
                Err(BridgeError::NotFound(_)) => {
                    debug!(
                        "Web hook {} on {} was already gone",
                        hook.id, project.path_with_namespace
                    );
                    report.hooks_already_gone += 1;
                }
                Err(e) => {
                    warn!(
                        "Failed to delete web hook {} on {}: {e}",
                        hook.id, project.path_with_namespace
                    );
                    report.record(project, e);
                    cleared = false;
                }
            }
        }

        Ok(cleared)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gitlab::test_support::{
        client_with_retries, mock_current_user, mock_projects, server_client,
    };
    use mockito::{Matcher, Server};
    use serde_json::{json, Value};
    use std::sync::{Arc, Mutex};

    const CALLBACK: &str = "https://bridge.example.com/events";

    fn callback() -> Url {
        Url::parse(CALLBACK).unwrap()
    }

    async fn mock_hooks(server: &mut Server, project_id: u64, body: Value) -> mockito::Mock {
        server
            .mock("GET", format!("/api/v4/projects/{project_id}/hooks").as_str())
            .match_query(Matcher::Any)
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
            .create_async()
            .await
    }

    async fn mock_create(server: &mut Server, project_id: u64, hook_id: u64) -> mockito::Mock {
        server
            .mock("POST", format!("/api/v4/projects/{project_id}/hooks").as_str())
            .match_body(Matcher::PartialJson(json!({
                "url": CALLBACK,
                "job_events": true,
                "pipeline_events": true,
            })))
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(
                json!({"id": hook_id, "url": CALLBACK, "job_events": true, "pipeline_events": true})
                    .to_string(),
            )
            .create_async()
            .await
    }

    #[tokio::test]
    async fn test_install_replaces_duplicates_and_keeps_foreign_hooks() {
        let mut server = Server::new_async().await;
        mock_current_user(&mut server, false).await;
        mock_projects(&mut server, "owned=true", r#"[{"id":1,"path_with_namespace":"teamA/app"}]"#)
            .await;
        mock_hooks(
            &mut server,
            1,
            json!([
                {"id": 10, "url": CALLBACK},
                {"id": 11, "url": "https://other.example.com/hook"},
                {"id": 12, "url": CALLBACK},
            ]),
        )
        .await;
        let delete_10 = server
            .mock("DELETE", "/api/v4/projects/1/hooks/10")
            .with_status(204)
            .create_async()
            .await;
        let delete_12 = server
            .mock("DELETE", "/api/v4/projects/1/hooks/12")
            .with_status(204)
            .create_async()
            .await;
        let delete_foreign = server
            .mock("DELETE", "/api/v4/projects/1/hooks/11")
            .expect(0)
            .create_async()
            .await;
        let create = mock_create(&mut server, 1, 13).await;

        let client = server_client(&server);
        let url = callback();
        let settings = HookSettings::default();
        let reconciler = WebhookReconciler::new(ProjectCatalog::new(&client), &url, &settings);
        let report = reconciler.install().await;

        assert!(report.is_clean());
        assert_eq!(report.projects, 1);
        assert_eq!(report.hooks_deleted, 2);
        assert_eq!(report.hooks_created, 1);
        delete_10.assert_async().await;
        delete_12.assert_async().await;
        delete_foreign.assert_async().await;
        create.assert_async().await;
    }

    #[tokio::test]
    async fn test_teardown_never_creates() {
        let mut server = Server::new_async().await;
        mock_current_user(&mut server, true).await;
        mock_projects(&mut server, "", r#"[{"id":5,"path_with_namespace":"ops/infra"}]"#).await;
        mock_hooks(&mut server, 5, json!([{"id": 50, "url": CALLBACK}])).await;
        let delete = server
            .mock("DELETE", "/api/v4/projects/5/hooks/50")
            .with_status(204)
            .create_async()
            .await;
        let create = server
            .mock("POST", "/api/v4/projects/5/hooks")
            .expect(0)
            .create_async()
            .await;

        let client = server_client(&server);
        let url = callback();
        let settings = HookSettings::default();
        let reconciler = WebhookReconciler::new(ProjectCatalog::new(&client), &url, &settings);
        let report = reconciler.teardown().await;

        assert_eq!(report.phase, Phase::Teardown);
        assert_eq!(report.hooks_deleted, 1);
        assert_eq!(report.hooks_created, 0);
        delete.assert_async().await;
        create.assert_async().await;
    }

    #[tokio::test]
    async fn test_delete_failure_in_one_project_does_not_stop_others() {
        let mut server = Server::new_async().await;
        mock_current_user(&mut server, false).await;
        mock_projects(
            &mut server,
            "owned=true",
            r#"[{"id":1,"path_with_namespace":"t/one"},{"id":2,"path_with_namespace":"t/two"},{"id":3,"path_with_namespace":"t/three"}]"#,
        )
        .await;
        for id in 1..=3 {
            mock_hooks(&mut server, id, json!([{"id": id * 100, "url": CALLBACK}])).await;
        }
        server
            .mock("DELETE", "/api/v4/projects/1/hooks/100")
            .with_status(204)
            .create_async()
            .await;
        server
            .mock("DELETE", "/api/v4/projects/2/hooks/200")
            .with_status(403)
            .with_body(r#"{"message":"403 Forbidden"}"#)
            .create_async()
            .await;
        server
            .mock("DELETE", "/api/v4/projects/3/hooks/300")
            .with_status(204)
            .create_async()
            .await;
        let create_1 = mock_create(&mut server, 1, 101).await;
        let create_2 = server
            .mock("POST", "/api/v4/projects/2/hooks")
            .expect(0)
            .create_async()
            .await;
        let create_3 = mock_create(&mut server, 3, 301).await;

        let client = server_client(&server);
        let url = callback();
        let settings = HookSettings::default();
        let reconciler = WebhookReconciler::new(ProjectCatalog::new(&client), &url, &settings);
        let report = reconciler.install().await;

        assert_eq!(report.projects, 3);
        assert_eq!(report.hooks_created, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].project, "t/two");
        assert!(matches!(
            report.failures[0].error,
            BridgeError::ApiError { status: 403, .. }
        ));
        create_1.assert_async().await;
        create_2.assert_async().await;
        create_3.assert_async().await;
    }

    #[tokio::test]
    async fn test_hook_listing_failure_skips_only_that_project() {
        let mut server = Server::new_async().await;
        mock_current_user(&mut server, false).await;
        mock_projects(
            &mut server,
            "owned=true",
            r#"[{"id":1,"path_with_namespace":"t/gone"},{"id":2,"path_with_namespace":"t/ok"}]"#,
        )
        .await;
        server
            .mock("GET", "/api/v4/projects/1/hooks")
            .match_query(Matcher::Any)
            .with_status(404)
            .create_async()
            .await;
        mock_hooks(&mut server, 2, json!([])).await;
        let create = mock_create(&mut server, 2, 7).await;

        let client = server_client(&server);
        let url = callback();
        let settings = HookSettings::default();
        let reconciler = WebhookReconciler::new(ProjectCatalog::new(&client), &url, &settings);
        let report = reconciler.install().await;

        assert_eq!(report.hooks_created, 1);
        assert_eq!(report.failures.len(), 1);
        assert!(matches!(report.failures[0].error, BridgeError::NotFound(_)));
        create.assert_async().await;
    }

    #[tokio::test]
    async fn test_project_listing_failure_aborts_pass() {
        let mut server = Server::new_async().await;
        mock_current_user(&mut server, false).await;
        server
            .mock("GET", "/api/v4/projects")
            .match_query(Matcher::Any)
            .with_status(500)
            .create_async()
            .await;
        let hooks = server
            .mock("GET", Matcher::Regex(r"^/api/v4/projects/\d+/hooks".into()))
            .expect(0)
            .create_async()
            .await;

        let client = server_client(&server);
        let url = callback();
        let settings = HookSettings::default();
        let reconciler = WebhookReconciler::new(ProjectCatalog::new(&client), &url, &settings);
        let report = reconciler.install().await;

        assert!(report.aborted.is_some());
        assert_eq!(report.projects, 0);
        hooks.assert_async().await;
    }

    /// Hooks of project 1 kept in memory so consecutive passes see each other's writes.
    ///
    /// Every POST stores the hook, whatever `create_status` it answers with.
    async fn stateful_hooks(
        server: &mut Server,
        hooks: Arc<Mutex<Vec<Value>>>,
        create_status: usize,
    ) {
        let listed = Arc::clone(&hooks);
        server
            .mock("GET", "/api/v4/projects/1/hooks")
            .match_query(Matcher::Any)
            .with_header("content-type", "application/json")
            .with_body_from_request(move |_| {
                Value::Array(listed.lock().unwrap().clone())
                    .to_string()
                    .into_bytes()
            })
            .create_async()
            .await;

        let deleted = Arc::clone(&hooks);
        server
            .mock("DELETE", Matcher::Regex(r"^/api/v4/projects/1/hooks/\d+$".into()))
            .with_status(204)
            .with_body_from_request(move |request| {
                let id: u64 = request
                    .path()
                    .rsplit('/')
                    .next()
                    .and_then(|id| id.parse().ok())
                    .unwrap();
                deleted.lock().unwrap().retain(|hook| hook["id"] != id);
                Vec::new()
            })
            .create_async()
            .await;

        let created = Arc::clone(&hooks);
        server
            .mock("POST", "/api/v4/projects/1/hooks")
            .with_status(create_status)
            .with_header("content-type", "application/json")
            .with_body_from_request(move |request| {
                let body: Value = serde_json::from_slice(request.body().unwrap()).unwrap();
                let mut hooks = created.lock().unwrap();
                let id = hooks
                    .iter()
                    .filter_map(|hook| hook["id"].as_u64())
                    .max()
                    .unwrap_or(0)
                    + 1;
                let hook = json!({
                    "id": id,
                    "url": body["url"],
                    "job_events": body["job_events"],
                    "pipeline_events": body["pipeline_events"],
                });
                hooks.push(hook.clone());
                hook.to_string().into_bytes()
            })
            .create_async()
            .await;
    }

    #[tokio::test]
    async fn test_install_is_idempotent() {
        let mut server = Server::new_async().await;
        mock_current_user(&mut server, false).await;
        mock_projects(&mut server, "owned=true", r#"[{"id":1,"path_with_namespace":"teamA/app"}]"#)
            .await;
        let hooks = Arc::new(Mutex::new(vec![
            json!({"id": 1, "url": CALLBACK, "job_events": false, "pipeline_events": false}),
            json!({"id": 2, "url": CALLBACK, "job_events": true, "pipeline_events": true}),
            json!({"id": 3, "url": "https://other.example.com/hook"}),
        ]));
        stateful_hooks(&mut server, Arc::clone(&hooks), 201).await;

        let client = server_client(&server);
        let url = callback();
        let settings = HookSettings::default();
        let reconciler = WebhookReconciler::new(ProjectCatalog::new(&client), &url, &settings);

        let first = reconciler.install().await;
        let second = reconciler.install().await;

        assert!(first.is_clean());
        assert!(second.is_clean());
        assert_eq!(second.hooks_deleted, 1);

        let hooks = hooks.lock().unwrap();
        let ours: Vec<_> = hooks.iter().filter(|hook| hook["url"] == CALLBACK).collect();
        assert_eq!(ours.len(), 1);
        assert_eq!(ours[0]["job_events"], true);
        assert_eq!(ours[0]["pipeline_events"], true);
        assert!(hooks
            .iter()
            .any(|hook| hook["url"] == "https://other.example.com/hook"));
    }

    #[tokio::test]
    async fn test_create_lost_in_gateway_error_is_not_repeated() {
        let mut server = Server::new_async().await;
        mock_current_user(&mut server, false).await;
        mock_projects(&mut server, "owned=true", r#"[{"id":1,"path_with_namespace":"t/app"}]"#)
            .await;
        let hooks = Arc::new(Mutex::new(vec![json!({"id": 1, "url": CALLBACK})]));
        stateful_hooks(&mut server, Arc::clone(&hooks), 502).await;

        let client = client_with_retries(&server.url(), 1);
        let url = callback();
        let settings = HookSettings::default();
        let reconciler = WebhookReconciler::new(ProjectCatalog::new(&client), &url, &settings);
        let report = reconciler.install().await;

        let hooks = hooks.lock().unwrap();
        let ours = hooks.iter().filter(|hook| hook["url"] == CALLBACK).count();
        assert_eq!(ours, 1);
        assert_eq!(report.hooks_deleted, 1);
        assert_eq!(report.hooks_created, 1);
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn test_create_failure_is_recorded_when_no_hook_appeared() {
        let mut server = Server::new_async().await;
        mock_current_user(&mut server, false).await;
        mock_projects(&mut server, "owned=true", r#"[{"id":1,"path_with_namespace":"t/app"}]"#)
            .await;
        mock_hooks(&mut server, 1, json!([])).await;
        server
            .mock("POST", "/api/v4/projects/1/hooks")
            .with_status(422)
            .with_body(r#"{"message":"url is blocked"}"#)
            .create_async()
            .await;

        let client = server_client(&server);
        let url = callback();
        let settings = HookSettings::default();
        let reconciler = WebhookReconciler::new(ProjectCatalog::new(&client), &url, &settings);
        let report = reconciler.install().await;

        assert_eq!(report.hooks_created, 0);
        assert_eq!(report.failures.len(), 1);
        assert!(matches!(
            report.failures[0].error,
            BridgeError::ApiError { status: 422, .. }
        ));
    }

    #[tokio::test]
    async fn test_hook_already_deleted_elsewhere_still_gets_replaced() {
        let mut server = Server::new_async().await;
        mock_current_user(&mut server, false).await;
        mock_projects(&mut server, "owned=true", r#"[{"id":1,"path_with_namespace":"t/app"}]"#)
            .await;
        mock_hooks(&mut server, 1, json!([{"id": 10, "url": CALLBACK}])).await;
        server
            .mock("DELETE", "/api/v4/projects/1/hooks/10")
            .with_status(404)
            .with_body(r#"{"message":"404 Not found"}"#)
            .create_async()
            .await;
        let create = mock_create(&mut server, 1, 11).await;

        let client = server_client(&server);
        let url = callback();
        let settings = HookSettings::default();
        let reconciler = WebhookReconciler::new(ProjectCatalog::new(&client), &url, &settings);
        let report = reconciler.install().await;

        assert!(report.is_clean());
        assert_eq!(report.hooks_deleted, 0);
        assert_eq!(report.hooks_already_gone, 1);
        assert_eq!(report.hooks_created, 1);
        create.assert_async().await;
    }
}
