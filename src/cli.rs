use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use log::info;
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;

use deploylens::aggregate::{FacetValue, ASSIGNEE_FACET, STATE_FACET};
use deploylens::api::{ApiClient, DashboardSource};
use deploylens::auth::{Identity, Token};
use deploylens::cascade::Dashboard;
use deploylens::config::{Config, OutputFormat};

use crate::output::{
    export_json, render_dashboard, render_pending_approvals, render_projects, render_releases,
    LoadProgress,
};

#[derive(Parser)]
#[command(name = "deploylens")]
#[command(author, version, about = "Release & Deployment Dashboard", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to ./deploylens.toml or the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Backend base URL
    #[arg(long, global = true, env = "DEPLOYLENS_URL")]
    url: Option<String>,

    /// Bearer token for the backend
    #[arg(long, global = true, env = "DEPLOYLENS_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Email of the signed-in user, enables user-scoped approvals
    #[arg(long, global = true, env = "DEPLOYLENS_USER")]
    user: Option<String>,

    #[arg(long, global = true, value_enum)]
    format: Option<OutputFormat>,

    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    #[arg(short, long, global = true, default_value_t = false)]
    pretty: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List projects
    Projects,

    /// List releases or iterations of a project
    Releases {
        #[arg(short = 'P', long)]
        project: String,
    },

    /// Show every view for a project, release and optional pipeline
    Dashboard {
        #[arg(short = 'P', long)]
        project: Option<String>,

        #[arg(short, long)]
        release: Option<String>,

        /// Definition id of a classic pipeline
        #[arg(long)]
        pipeline: Option<String>,

        /// Release id whose work items to show
        #[arg(long)]
        run: Option<u64>,

        /// Definition id of a YAML pipeline whose builds to show
        #[arg(long)]
        yaml_pipeline: Option<String>,

        /// Filter work items by state
        #[arg(long)]
        state: Option<String>,

        /// Filter work items by assignee
        #[arg(long)]
        assignee: Option<String>,
    },

    /// Show pending approvals
    Approvals {
        #[arg(short = 'P', long)]
        project: Option<String>,

        #[arg(short, long)]
        release: Option<String>,

        /// Only approvals awaiting the signed-in user
        #[arg(long, default_value_t = false)]
        mine: bool,
    },

    /// Write the effective configuration, flags included, to a file
    Init {
        #[arg(default_value = "deploylens.toml")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long, default_value_t = false)]
        force: bool,
    },
}

/// JSON envelope of every command's output.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Report<'a, T: Serialize> {
    command: &'a str,
    collected_at: DateTime<Utc>,
    data: T,
}

/// Settings after merging flags, environment and the config file.
struct Settings {
    config: Config,
    url: String,
    token: Option<Token>,
    identity: Option<Identity>,
    format: OutputFormat,
    pretty: bool,
}

impl Settings {
    /// The file configuration with every flag and environment override folded in.
    fn effective_config(&self) -> Config {
        let mut config = self.config.clone();
        config.api.base_url = self.url.clone();
        config.session.user_email = self.identity.as_ref().map(|id| id.email().to_string());
        config.output.format = self.format;
        config.output.pretty = self.pretty;
        config
    }
}

impl Cli {
    fn settings(&self) -> Result<Settings> {
        let config = Config::load(self.config.as_deref())?;

        let url = self.url.clone().unwrap_or_else(|| config.api.base_url.clone());
        let token = self
            .token
            .clone()
            .or_else(|| config.api.token.clone())
            .map(Token::from);
        let identity = self
            .user
            .clone()
            .or_else(|| config.session.user_email.clone())
            .and_then(Identity::new);
        let format = self.format.unwrap_or(config.output.format);
        let pretty = self.pretty || config.output.pretty;

        Ok(Settings {
            config,
            url,
            token,
            identity,
            format,
            pretty,
        })
    }

    fn emit<T: Serialize>(
        &self,
        settings: &Settings,
        command: &str,
        data: T,
        summary: impl FnOnce(&T) -> String,
    ) -> Result<()> {
        let mut rendered = Vec::new();
        match settings.format {
            OutputFormat::Json => {
                let report = Report {
                    command,
                    collected_at: Utc::now(),
                    data,
                };
                export_json(&report, settings.pretty, &mut rendered)?;
            }
            OutputFormat::Summary => {
                writeln!(rendered, "{}", summary(&data))?;
            }
        }

        if let Some(output_path) = &self.output {
            std::fs::write(output_path, rendered)
                .with_context(|| format!("Failed to write {}", output_path.display()))?;
            info!("Output written to: {}", output_path.display());
        } else {
            std::io::stdout().write_all(&rendered)?;
        }
        Ok(())
    }

    pub async fn execute(&self) -> Result<()> {
        let settings = self.settings()?;

        if let Commands::Init { path, force } = &self.command {
            if path.exists() && !force {
                bail!("{} already exists, pass --force to overwrite", path.display());
            }
            settings.effective_config().save(path)?;
            info!("Configuration written to: {}", path.display());
            return Ok(());
        }

        let client = ApiClient::new(&settings.url, settings.token.clone())?
            .with_release_source(settings.config.dashboard.release_source);
        info!("Using backend {}", client.api_url());
        let mut dashboard = Dashboard::new(client, settings.identity.clone());

        match &self.command {
            Commands::Projects => {
                settle(&mut dashboard, "Loaded projects").await;
                let view = dashboard.snapshot().projects;
                self.emit(&settings, "projects", view, render_projects)
            }
            Commands::Releases { project } => {
                dashboard.set_project(Some(project.clone()));
                settle(&mut dashboard, "Loaded releases").await;
                let view = dashboard.snapshot().releases;
                self.emit(&settings, "releases", view, |view| render_releases(project, view))
            }
            Commands::Dashboard {
                project,
                release,
                pipeline,
                run,
                yaml_pipeline,
                state,
                assignee,
            } => {
                select(&mut dashboard, &settings, project.as_deref(), release.as_deref()).await?;
                dashboard.set_pipeline(pipeline.clone());
                dashboard.set_yaml_pipeline(yaml_pipeline.clone());
                dashboard.open_release_run(*run);
                if let Some(state) = state {
                    dashboard.set_work_item_facet(STATE_FACET, FacetValue::parse(state));
                }
                if let Some(assignee) = assignee {
                    dashboard.set_work_item_facet(ASSIGNEE_FACET, FacetValue::parse(assignee));
                }
                settle(&mut dashboard, "Loaded dashboard").await;
                self.emit(&settings, "dashboard", dashboard.snapshot(), render_dashboard)
            }
            Commands::Approvals {
                project,
                release,
                mine,
            } => {
                if *mine && dashboard.identity().is_none() {
                    bail!("--mine needs a user: pass --user, set DEPLOYLENS_USER or [session] user-email");
                }
                select(&mut dashboard, &settings, project.as_deref(), release.as_deref()).await?;
                settle(&mut dashboard, "Loaded approvals").await;
                let mine = *mine;
                self.emit(&settings, "approvals", dashboard.snapshot(), |snapshot| {
                    render_pending_approvals(snapshot, mine)
                })
            }
            Commands::Init { .. } => Ok(()),
        }
    }
}

/// Applies settlements until nothing is loading, with a spinner on stderr.
async fn settle<S: DashboardSource>(dashboard: &mut Dashboard<S>, done: &str) {
    let progress = LoadProgress::start("Loading");
    while dashboard.is_busy() {
        progress.update(dashboard.loading_classes());
        if dashboard.next_event().await.is_none() {
            break;
        }
    }
    progress.finish(done);
}

/// Selects the project and, when given, the release by name, falling back
/// to the configured defaults.
async fn select<S: DashboardSource>(
    dashboard: &mut Dashboard<S>,
    settings: &Settings,
    project: Option<&str>,
    release: Option<&str>,
) -> Result<()> {
    let defaults = &settings.config.dashboard;
    let Some(project) = project.or(defaults.default_project.as_deref()) else {
        bail!("No project given: pass --project or set [dashboard] default-project");
    };
    dashboard.set_project(Some(project.to_string()));

    let Some(release) = release.or(defaults.default_release.as_deref()) else {
        return Ok(());
    };

    settle(dashboard, "Loaded releases").await;
    if let Some(error) = dashboard.releases().error() {
        bail!("Could not load releases of {project}: {error}");
    }
    if !dashboard.select_release_by_name(release) {
        bail!("Release '{release}' not found in project {project}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_dashboard_command() {
        let cli = Cli::try_parse_from([
            "deploylens",
            "--format",
            "json",
            "dashboard",
            "-P",
            "Alpha",
            "-r",
            "Sprint 1",
            "--pipeline",
            "7",
            "--run",
            "42",
            "--yaml-pipeline",
            "31",
            "--state",
            "Active",
        ])
        .unwrap();

        assert_eq!(cli.format, Some(OutputFormat::Json));
        match cli.command {
            Commands::Dashboard {
                project,
                release,
                pipeline,
                run,
                yaml_pipeline,
                state,
                assignee,
            } => {
                assert_eq!(project.as_deref(), Some("Alpha"));
                assert_eq!(release.as_deref(), Some("Sprint 1"));
                assert_eq!(pipeline.as_deref(), Some("7"));
                assert_eq!(run, Some(42));
                assert_eq!(yaml_pipeline.as_deref(), Some("31"));
                assert_eq!(state.as_deref(), Some("Active"));
                assert!(assignee.is_none());
            }
            _ => panic!("expected dashboard command"),
        }
    }

    #[test]
    fn test_releases_requires_project() {
        assert!(Cli::try_parse_from(["deploylens", "releases"]).is_err());
    }

    #[test]
    fn test_flags_override_config() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("deploylens.toml");
        std::fs::write(
            &path,
            "[api]\nbase-url = \"https://config.example.com\"\n\n[session]\nuser-email = \"cfg@example.com\"\n\n[output]\npretty = true\n",
        )
        .unwrap();

        let cli = Cli::try_parse_from([
            "deploylens",
            "--config",
            path.to_str().unwrap(),
            "--url",
            "https://flag.example.com",
            "projects",
        ])
        .unwrap();
        let settings = cli.settings().unwrap();

        assert_eq!(settings.url, "https://flag.example.com");
        assert_eq!(
            settings.identity.as_ref().map(Identity::email),
            Some("cfg@example.com")
        );
        assert!(settings.pretty);
        assert_eq!(settings.format, OutputFormat::Summary);
    }

    #[tokio::test]
    async fn test_init_writes_effective_config() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("deploylens.toml");
        let cli = Cli::try_parse_from([
            "deploylens",
            "--config",
            "missing.toml",
            "--url",
            "https://dash.example.com",
            "--user",
            "dev@example.com",
            "init",
            path.to_str().unwrap(),
        ])
        .unwrap();

        cli.execute().await.unwrap();
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.api.base_url, "https://dash.example.com");
        assert_eq!(config.session.user_email.as_deref(), Some("dev@example.com"));

        assert!(cli.execute().await.is_err());
    }

    #[tokio::test]
    async fn test_projects_command_writes_json_report() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/projects")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"projects":["Alpha","Beta"]}"#)
            .create_async()
            .await;

        let temp_dir = tempfile::tempdir().unwrap();
        let output = temp_dir.path().join("projects.json");
        let cli = Cli::try_parse_from([
            "deploylens",
            "--config",
            "missing.toml",
            "--url",
            server.url().as_str(),
            "--format",
            "json",
            "-o",
            output.to_str().unwrap(),
            "projects",
        ])
        .unwrap();

        cli.execute().await.unwrap();

        let report: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(report["command"], "projects");
        assert_eq!(report["data"]["status"]["status"], "ready");
        assert_eq!(report["data"]["data"], serde_json::json!(["Alpha", "Beta"]));
    }

    #[tokio::test]
    async fn test_unknown_release_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        let _projects = server
            .mock("GET", "/api/projects")
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;
        let _releases = server
            .mock("GET", "/api/releases")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(r#"[{"id": 1, "name": "Sprint 1"}]"#)
            .create_async()
            .await;

        let cli = Cli::try_parse_from([
            "deploylens",
            "--config",
            "missing.toml",
            "--url",
            server.url().as_str(),
            "dashboard",
            "-P",
            "Alpha",
            "-r",
            "Sprint 9",
        ])
        .unwrap();

        let error = cli.execute().await.unwrap_err();
        assert!(error.to_string().contains("Sprint 9"));
    }
}
