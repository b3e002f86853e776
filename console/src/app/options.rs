//! Application configuration options

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use openapi_client::{Environment, RunId};
use secrecy::SecretString;

use crate::errors::ConsoleError;
use crate::lifecycle::{Route, Stage};
use crate::logs::LogLevel;
use crate::stages::StageOptions;
use crate::storage::layout::StorageLayout;
use crate::storage::settings::Settings;
use crate::utils::non_blank;

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Backend API base URL
    pub backend_base_url: String,

    /// Bearer token for the control plane
    pub api_token: Option<SecretString>,

    /// Storage layout paths
    pub layout: StorageLayout,

    /// Stage cadences and defaults
    pub stages: StageOptions,

    /// How often a watch loop re-renders the current view
    pub render_interval: Duration,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            backend_base_url: Settings::default().backend.base_url,
            api_token: None,
            layout: StorageLayout::default(),
            stages: StageOptions::default(),
            render_interval: Duration::from_millis(250),
        }
    }
}

impl AppOptions {
    /// Options from the settings file, with command-line overrides applied
    pub fn from_settings(settings: &Settings, layout: StorageLayout, overrides: &Overrides) -> Self {
        Self {
            backend_base_url: overrides
                .api
                .clone()
                .unwrap_or_else(|| settings.backend.base_url.clone()),
            api_token: settings.backend.api_token.clone(),
            layout,
            stages: StageOptions::from(settings),
            ..Default::default()
        }
    }
}

/// Global command-line overrides
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    pub data_dir: Option<PathBuf>,
    pub api: Option<String>,
    pub log_level: Option<LogLevel>,
}

impl Overrides {
    pub fn from_args(args: &HashMap<String, String>) -> Result<Self, ConsoleError> {
        let log_level = match non_blank(arg(args, "log-level")) {
            Some(level) => Some(level.parse().map_err(ConsoleError::ConfigError)?),
            None => None,
        };

        Ok(Self {
            data_dir: non_blank(arg(args, "data-dir")).map(PathBuf::from),
            api: non_blank(arg(args, "api")).map(str::to_string),
            log_level,
        })
    }

    pub fn layout(&self) -> StorageLayout {
        match &self.data_dir {
            Some(dir) => StorageLayout::new(dir),
            None => StorageLayout::default(),
        }
    }
}

/// What the console was asked to do
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Upload an artifact and mint a run
    Upload { artifact: Option<PathBuf> },

    /// Enter prepare, optionally pick a GPU and start, then watch
    Prepare {
        run_id: Option<RunId>,
        gpu: Option<String>,
        start: bool,
    },

    /// One-shot deploy status, optionally start and keep refreshing
    Deploy {
        run_id: Option<RunId>,
        environment: Option<Environment>,
        start: bool,
        watch: Option<Duration>,
    },

    /// Poll monitoring metrics until interrupted
    Monitor { run_id: Option<RunId> },

    /// Print the persisted current run
    Status,
}

impl Command {
    /// Pick the command from parsed `--key=value` arguments.
    ///
    /// `--route=/deploy?runId=r1` selects the stage and run id the way a
    /// navigation target does; an explicit `--run-id` still wins.
    /// `Ok(None)` when no command flag was given.
    pub fn from_args(args: &HashMap<String, String>) -> Result<Option<Self>, ConsoleError> {
        let route = match non_blank(arg(args, "route")) {
            Some(path) => Some(Route::parse(path)?),
            None => None,
        };
        let run_id = non_blank(arg(args, "run-id"))
            .map(RunId::from)
            .or_else(|| route.as_ref().and_then(|route| route.run_id.clone()));
        let selected = |stage: Stage| {
            route.as_ref().is_some_and(|route| route.stage == stage)
                || args.contains_key(stage.as_str())
        };

        if selected(Stage::Upload) {
            let artifact = non_blank(arg(args, "upload"))
                .filter(|path| *path != "true")
                .map(PathBuf::from);
            return Ok(Some(Command::Upload { artifact }));
        }

        if selected(Stage::Prepare) {
            return Ok(Some(Command::Prepare {
                run_id,
                gpu: non_blank(arg(args, "gpu")).map(str::to_string),
                start: flag(args, "start"),
            }));
        }

        if selected(Stage::Deploy) {
            let environment = match non_blank(arg(args, "env")) {
                Some(env) => Some(env.parse().map_err(ConsoleError::ConfigError)?),
                None => None,
            };
            let watch = match non_blank(arg(args, "watch-secs")) {
                Some(secs) => {
                    let secs: u64 = secs.parse().map_err(|_| {
                        ConsoleError::ConfigError(format!("Invalid --watch-secs value: {}", secs))
                    })?;
                    (secs > 0).then(|| Duration::from_secs(secs))
                }
                None => None,
            };
            return Ok(Some(Command::Deploy {
                run_id,
                environment,
                start: flag(args, "start"),
                watch,
            }));
        }

        if selected(Stage::Monitor) {
            return Ok(Some(Command::Monitor { run_id }));
        }

        if args.contains_key("status") {
            return Ok(Some(Command::Status));
        }

        Ok(None)
    }
}

fn arg<'a>(args: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    args.get(key).map(String::as_str)
}

fn flag(args: &HashMap<String, String>, key: &str) -> bool {
    matches!(arg(args, key), Some("true") | Some("1") | Some("yes"))
}
