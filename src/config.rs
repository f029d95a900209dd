use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::error::{AppError, Result};

pub const DEFAULT_BASE_URL: &str = "https://divecloud.nouvola.com/api/v1";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_LISTEN_TIMEOUT_MINS: u64 = 60;
/// One week.
pub const MAX_LISTEN_TIMEOUT_MINS: u64 = 7 * 24 * 60;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub run: RunConfig,
    #[serde(default)]
    pub workspace: WorkspaceConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    pub api_key: Secret,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

/// Everything a single plan run needs from the outside world.
#[derive(Debug, Deserialize, Clone)]
pub struct RunConfig {
    pub plan_id: String,
    /// Credential passphrase sent with the trigger call. May be empty when
    /// the plan has no encrypted credentials.
    #[serde(default)]
    pub creds_pass: Secret,
    /// Empty or absent means "poll for the result".
    #[serde(default, deserialize_with = "empty_as_none")]
    pub callback_url: Option<String>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub poll_interval_secs: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub listen_timeout_mins: Option<u64>,
    #[serde(default = "default_listen_host")]
    pub listen_host: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkspaceConfig {
    #[serde(default = "default_workspace_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_results_file")]
    pub results_file: String,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            dir: default_workspace_dir(),
            results_file: default_results_file(),
        }
    }
}

/// A string that must never end up in logs.
#[derive(Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl RunConfig {
    pub fn callback_url(&self) -> Option<&str> {
        self.callback_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.unwrap_or(DEFAULT_POLL_INTERVAL_SECS))
    }

    pub fn listen_timeout(&self) -> Duration {
        Duration::from_secs(
            self.listen_timeout_mins
                .unwrap_or(DEFAULT_LISTEN_TIMEOUT_MINS)
                .saturating_mul(60),
        )
    }
}

/// Values supplied on the command line; they win over file and environment.
#[derive(Debug, Default)]
pub struct Overrides {
    pub config_path: Option<String>,
    pub plan_id: Option<String>,
    pub callback_url: Option<String>,
    pub poll_interval_secs: Option<u64>,
    pub listen_timeout_mins: Option<u64>,
    pub workspace_dir: Option<PathBuf>,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_request_timeout() -> u64 {
    60
}

fn default_listen_host() -> String {
    "0.0.0.0".to_string()
}

fn default_workspace_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_results_file() -> String {
    "results.txt".to_string()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    Number(u64),
    Text(String),
}

fn lenient_u64<'de, D>(deserializer: D) -> std::result::Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<NumberOrText>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumberOrText::Number(n)) => Ok(Some(n)),
        Some(NumberOrText::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(NumberOrText::Text(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("expected an integer, got {s:?}"))),
    }
}

fn empty_as_none<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}

/// Environment variable overrides, e.g. `DIVECLOUD_API__API_KEY`.
fn environment() -> config::Environment {
    config::Environment::with_prefix("DIVECLOUD")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

impl AppConfig {
    pub fn load(overrides: &Overrides) -> Result<Self> {
        let mut builder = config::Config::builder();

        // Load from file if specified
        if let Some(path) = overrides.config_path.as_deref() {
            builder = builder.add_source(config::File::with_name(path));
        } else {
            builder = builder.add_source(
                config::File::with_name("divecloud-runner").required(false),
            );
        }

        builder = builder.add_source(environment());

        builder = builder
            .set_override_option("run.plan_id", overrides.plan_id.clone())
            .and_then(|b| b.set_override_option("run.callback_url", overrides.callback_url.clone()))
            .and_then(|b| {
                b.set_override_option(
                    "run.poll_interval_secs",
                    overrides.poll_interval_secs.map(|v| v.to_string()),
                )
            })
            .and_then(|b| {
                b.set_override_option(
                    "run.listen_timeout_mins",
                    overrides.listen_timeout_mins.map(|v| v.to_string()),
                )
            })
            .and_then(|b| {
                b.set_override_option(
                    "workspace.dir",
                    overrides
                        .workspace_dir
                        .as_ref()
                        .map(|p| p.display().to_string()),
                )
            })
            .map_err(|e| AppError::Config(e.to_string()))?;

        Self::build(builder)
    }

    fn build(builder: config::ConfigBuilder<config::builder::DefaultState>) -> Result<Self> {
        let config: AppConfig = builder
            .build()
            .map_err(|e| AppError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| AppError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.run.plan_id.trim().is_empty() {
            return Err(AppError::Config("Please set a Plan ID".to_string()));
        }
        if self.api.api_key.expose().trim().is_empty() {
            return Err(AppError::Config(
                "Please enter your DiveCloud API Key".to_string(),
            ));
        }
        if self.run.poll_interval_secs == Some(0) {
            return Err(AppError::Config(
                "Poll interval must be a positive number of seconds".to_string(),
            ));
        }
        if self.run.listen_timeout_mins == Some(0) {
            return Err(AppError::Config(
                "Listen timeout must be a positive number of minutes".to_string(),
            ));
        }
        if self
            .run
            .listen_timeout_mins
            .is_some_and(|mins| mins > MAX_LISTEN_TIMEOUT_MINS)
        {
            return Err(AppError::Config(format!(
                "Listen timeout must be at most {MAX_LISTEN_TIMEOUT_MINS} minutes"
            )));
        }
        Ok(())
    }

    pub fn results_path(&self) -> PathBuf {
        self.workspace.dir.join(&self.workspace.results_file)
    }
}
