use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};
use std::path::PathBuf;

use crate::auth::Token;
use crate::config::Config;
use crate::gitlab::{GitLabClient, ProjectCatalog};
use crate::lifecycle::{self, Lifecycle};
use crate::liveness;
use crate::output::{render_job_list, render_report, PassProgress};
use crate::reconcile::Phase;
use crate::topology::TopologyBuilder;

#[derive(Parser)]
#[command(name = "gitlab-ci-bridge")]
#[command(author, version, about = "GitLab webhook reconciliation and pipeline discovery", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML, JSON or YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[arg(short, long, global = true, env = "GITLAB_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// GitLab instance base URL
    #[arg(long, global = true, env = "GITLAB_URL")]
    gitlab_url: Option<String>,

    /// Externally reachable base URL of this process
    #[arg(long, global = true, env = "CI_BRIDGE_SERVER_URL")]
    server_url: Option<String>,

    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    #[arg(short, long, global = true, default_value_t = false)]
    pretty: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Install webhooks, probe the callback URL, and remove the webhooks on Ctrl-C
    Run,
    /// Replace the bridge webhook on every project once
    Install,
    /// Remove the bridge webhook from every project once
    Teardown,
    /// Print one pipeline job per visible project
    Jobs {
        #[arg(long, default_value_t = false)]
        table: bool,
    },
    /// Resolve a job id (e.g. `pipeline:group/project`) into a pipeline node
    Structure { id: String },
    /// Check that GitLab can reach the callback URL
    Probe,
}

impl Cli {
    fn resolve_config(&self) -> Result<Config> {
        let mut config = Config::load(self.config.as_deref())?;

        if let Some(token) = &self.token {
            config.gitlab.token = Some(token.clone());
        }
        if let Some(url) = &self.gitlab_url {
            config.gitlab.base_url = url.clone();
        }
        if let Some(url) = &self.server_url {
            config.server.base_url = Some(url.clone());
        }

        Ok(config)
    }

    fn gitlab_client(config: &Config) -> Result<GitLabClient> {
        let token = config.gitlab.token.as_deref().map(Token::from);
        let client = GitLabClient::new(
            &config.gitlab.base_url,
            token,
            config.gitlab.client_options(),
        )?;
        info!("Using GitLab API at {}", client.api_url());

        Ok(client)
    }

    fn server_base_url(config: &Config) -> Result<&str> {
        config
            .server
            .base_url
            .as_deref()
            .context("No server base URL configured (set server.base-url or --server-url)")
    }

    fn lifecycle(config: &Config) -> Result<Lifecycle> {
        let client = Self::gitlab_client(config)?;
        let lifecycle = Lifecycle::new(
            client,
            Self::server_base_url(config)?,
            config.server.hook_settings(),
        )?;

        Ok(lifecycle)
    }

    fn write_output(&self, contents: &str) -> Result<()> {
        if let Some(output_path) = &self.output {
            std::fs::write(output_path, contents)
                .with_context(|| format!("Failed to write {}", output_path.display()))?;
            info!("Output written to: {}", output_path.display());
        } else {
            println!("{contents}");
        }

        Ok(())
    }

    fn to_json(&self, value: &impl serde::Serialize) -> Result<String> {
        let json = if self.pretty {
            serde_json::to_string_pretty(value)?
        } else {
            serde_json::to_string(value)?
        };

        Ok(json)
    }

    async fn execute_run(&self, config: &Config) -> Result<()> {
        let lifecycle = Self::lifecycle(config)?;

        lifecycle.start().await;
        // The event listener runs outside this process; it is ready once hooks point at it.
        drop(lifecycle.spawn_liveness_probe());
        info!("Webhooks point at {}; press Ctrl-C to stop", lifecycle.callback_url());

        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to wait for shutdown signal: {e}");
        }

        lifecycle.shutdown().await;

        Ok(())
    }

    async fn execute_pass(&self, config: &Config, phase: Phase) -> Result<()> {
        let lifecycle = Self::lifecycle(config)?;
        let reconciler = lifecycle.reconciler();

        let progress = PassProgress::start(phase);
        let report = match phase {
            Phase::Install => reconciler.install().await,
            Phase::Teardown => reconciler.teardown().await,
        };
        progress.finish(&report);

        self.write_output(&render_report(&report))
    }

    async fn execute_jobs(&self, config: &Config, table: bool) -> Result<()> {
        let client = Self::gitlab_client(config)?;
        let builder = TopologyBuilder::new(ProjectCatalog::new(&client));

        let jobs = builder.job_list().await;

        if table {
            self.write_output(&render_job_list(&jobs))
        } else {
            self.write_output(&self.to_json(&jobs)?)
        }
    }

    async fn execute_structure(&self, config: &Config, id: &str) -> Result<()> {
        let client = Self::gitlab_client(config)?;
        let builder = TopologyBuilder::new(ProjectCatalog::new(&client));

        let node = builder.build_node(id).await;

        self.write_output(&self.to_json(&node)?)
    }

    async fn execute_probe(&self, config: &Config) -> Result<()> {
        let callback_url = lifecycle::callback_url(Self::server_base_url(config)?)?;

        let outcome = liveness::probe(&callback_url).await;

        if outcome.is_reachable() {
            self.write_output(&format!("{callback_url} is reachable"))
        } else {
            self.write_output(&format!("{callback_url} is not reachable: {outcome:?}"))
        }
    }

    pub async fn execute(&self) -> Result<()> {
        let config = self.resolve_config()?;

        match &self.command {
            Commands::Run => self.execute_run(&config).await,
            Commands::Install => self.execute_pass(&config, Phase::Install).await,
            Commands::Teardown => self.execute_pass(&config, Phase::Teardown).await,
            Commands::Jobs { table } => self.execute_jobs(&config, *table).await,
            Commands::Structure { id } => self.execute_structure(&config, id).await,
            Commands::Probe => self.execute_probe(&config).await,
        }
    }
}
