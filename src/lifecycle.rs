use log::info;
use tokio::task::JoinHandle;
use url::Url;

use crate::error::{BridgeError, Result};
use crate::gitlab::{GitLabClient, HookSettings, ProjectCatalog};
use crate::liveness::{self, ProbeOutcome};
use crate::reconcile::{ReconcileReport, WebhookReconciler};

/// Path of the event listener, relative to the server base URL.
pub const EVENTS_PATH: &str = "events";

/// Resolves the webhook target from the externally reachable server base URL.
///
/// Standard relative resolution applies: `https://h/app/` gives
/// `https://h/app/events` while `https://h/app` gives `https://h/events`.
pub fn callback_url(server_base_url: &str) -> Result<Url> {
    Url::parse(server_base_url)
        .map_err(|e| BridgeError::Config(format!("Invalid server base URL '{server_base_url}': {e}")))?
        .join(EVENTS_PATH)
        .map_err(|e| BridgeError::Config(format!("Invalid callback URL: {e}")))
}

/// Owns the GitLab client for the life of the process and brackets it with
/// webhook install on start and webhook removal on shutdown.
///
/// Neither phase can fail: every remote error ends up in the returned report.
pub struct Lifecycle {
    client: GitLabClient,
    callback_url: Url,
    hook_settings: HookSettings,
}

impl Lifecycle {
    /// # Errors
    ///
    /// Returns [`BridgeError::Config`] if the server base URL is malformed.
    pub fn new(
        client: GitLabClient,
        server_base_url: &str,
        hook_settings: HookSettings,
    ) -> Result<Self> {
        Ok(Self {
            client,
            callback_url: callback_url(server_base_url)?,
            hook_settings,
        })
    }

    pub fn callback_url(&self) -> &Url {
        &self.callback_url
    }

    pub fn reconciler(&self) -> WebhookReconciler<'_> {
        WebhookReconciler::new(
            ProjectCatalog::new(&self.client),
            &self.callback_url,
            &self.hook_settings,
        )
    }

    pub async fn start(&self) -> ReconcileReport {
        info!("Creating GitLab webhooks for {} ...", self.callback_url);
        self.reconciler().install().await
    }

    /// Fire-and-forget reachability check, to be called once the listener is ready.
    pub fn spawn_liveness_probe(&self) -> JoinHandle<ProbeOutcome> {
        liveness::spawn_probe(self.callback_url.clone())
    }

    /// Removes the webhooks, then releases the client.
    pub async fn shutdown(self) -> ReconcileReport {
        info!("Destroying GitLab webhooks ...");
        self.reconciler().teardown().await
    }
}
