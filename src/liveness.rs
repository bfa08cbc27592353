use log::{info, warn};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tokio::task::JoinHandle;
use url::Url;

/// Body the event listener answers a plain `GET` with.
pub const LISTENING: &str = "Listening to GitLab events!!!";

const PROBE_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug)]
pub enum ProbeOutcome {
    Reachable,
    UnexpectedStatus(u16),
    UnexpectedBody,
    Unreachable(reqwest::Error),
}

impl ProbeOutcome {
    pub fn is_reachable(&self) -> bool {
        matches!(self, Self::Reachable)
    }
}

/// Checks once that `callback_url` answers like the event listener.
///
/// Purely diagnostic: failures are logged as warnings, never retried.
pub async fn probe(callback_url: &Url) -> ProbeOutcome {
    let outcome = fetch(callback_url).await;

    match &outcome {
        ProbeOutcome::Reachable => {
            info!("Success while accessing the '{callback_url}' endpoint.");
        }
        ProbeOutcome::UnexpectedStatus(status) => warn!(
            "Error while accessing the '{callback_url}' endpoint (status {status}). Note that this endpoint must be accessible by GitLab."
        ),
        ProbeOutcome::UnexpectedBody => warn!(
            "Error while accessing the '{callback_url}' endpoint (unexpected response body). Note that this endpoint must be accessible by GitLab."
        ),
        ProbeOutcome::Unreachable(e) => warn!(
            "Error while accessing the '{callback_url}' endpoint ({e}). Note that this endpoint must be accessible by GitLab."
        ),
    }

    outcome
}

/// Runs [`probe`] in the background; nobody is required to await the handle.
pub fn spawn_probe(callback_url: Url) -> JoinHandle<ProbeOutcome> {
    tokio::spawn(async move { probe(&callback_url).await })
}

async fn fetch(callback_url: &Url) -> ProbeOutcome {
    let client = match Client::builder().timeout(PROBE_TIMEOUT).build() {
        Ok(client) => client,
        Err(e) => return ProbeOutcome::Unreachable(e),
    };

    let response = match client.get(callback_url.clone()).send().await {
        Ok(response) => response,
        Err(e) => return ProbeOutcome::Unreachable(e),
    };

    let status = response.status();
    if status != StatusCode::OK {
        return ProbeOutcome::UnexpectedStatus(status.as_u16());
    }

    match response.text().await {
        Ok(body) if body == LISTENING => ProbeOutcome::Reachable,
        Ok(_) => ProbeOutcome::UnexpectedBody,
        Err(e) => ProbeOutcome::Unreachable(e),
    }
}
