#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{
    path::PathBuf,
    sync::{Arc, Mutex, OnceLock},
    time::Duration,
};

use anyhow::{Context, Result};
use reqwest::Client;

/// Column layout and addressing for the quiz spreadsheet.
///
/// One row holds the answer key and, from `response_start_row` on, each row
/// holds one respondent's submission. The key and the responses are aligned,
/// so the correct answer sits in the same column as each respondent's answer
/// to that question. Outside the response range, `grade_col` is reserved for
/// the grade we write back.
#[derive(Debug, Clone)]
pub struct SheetConfig {
    /// ID of the Google spreadsheet.
    pub spreadsheet_id:     String,
    /// Base URL of the Sheets values API.
    pub endpoint:           String,
    /// OAuth bearer token with read/write access to the spreadsheet.
    pub token:              String,
    /// Row containing the correct answers.
    pub key_row:            u32,
    /// Column (letter) containing the respondent's name.
    pub name_col:           String,
    /// Column (letter) containing the respondent's OpenMRS ID.
    pub openmrs_id_col:     String,
    /// Column (letter) containing the respondent's email.
    pub email_col:          String,
    /// Column (letter) containing the URL of the issue claimed.
    pub issue_col:          String,
    /// Column (letter) containing the URL of the pull request submitted.
    pub pull_request_col:   String,
    /// Row in which responses start.
    pub response_start_row: u32,
    /// First column (letter) of the respondent's answers.
    pub response_start_col: String,
    /// Last column (letter) of the respondent's answers.
    pub response_end_col:   String,
    /// Column (letter) where the grade should be written.
    pub grade_col:          String,
}

/// Settings for the grading run and its notifications.
#[derive(Debug, Clone)]
pub struct GraderConfig {
    /// Minimum percentage considered a pass.
    pub passing_grade:   u32,
    /// Name of the badge granted to respondents who pass.
    pub badge_name:      String,
    /// Minimum time between grading runs.
    pub min_interval:    Duration,
    /// Path to the message body sent to respondents who pass.
    pub passed_template: PathBuf,
    /// Path to the message body sent to respondents who do not pass.
    pub failed_template: PathBuf,
}

/// Credentials for the Discourse API.
#[derive(Debug, Clone)]
pub struct DiscourseConfig {
    /// Hostname of the Discourse instance.
    pub host:         String,
    /// Username the API key acts as.
    pub api_username: String,
    /// API key used to authenticate requests.
    pub api_key:      String,
}

/// Runtime configuration shared across the crate.
pub struct ConfigState {
    /// Quiz spreadsheet layout and credentials.
    sheet:       SheetConfig,
    /// Grading and notification settings.
    grader:      GraderConfig,
    /// Discourse credentials.
    discourse:   DiscourseConfig,
    /// Shared reqwest HTTP client reused across both service clients.
    http_client: Client,
}

impl ConfigState {
    /// Construct a new configuration instance by reading the environment.
    fn new() -> Result<Self> {
        let sheet = SheetConfig {
            spreadsheet_id:     require_env("QUIZ_SPREADSHEET_ID")?,
            endpoint:           read_env_str("SHEETS_ENDPOINT", "https://sheets.googleapis.com"),
            token:              require_env("SHEETS_TOKEN")?,
            key_row:            read_env_u32("QUIZ_KEY_ROW", 2),
            name_col:           read_env_str("QUIZ_NAME_COL", "B"),
            openmrs_id_col:     read_env_str("QUIZ_OPENMRS_ID_COL", "C"),
            email_col:          read_env_str("QUIZ_EMAIL_COL", "D"),
            issue_col:          read_env_str("QUIZ_ISSUE_COL", "E"),
            pull_request_col:   read_env_str("QUIZ_PULL_REQUEST_COL", "F"),
            response_start_row: read_env_u32("QUIZ_RESPONSE_START_ROW", 3),
            response_start_col: read_env_str("QUIZ_RESPONSE_START_COL", "G"),
            response_end_col:   read_env_str("QUIZ_RESPONSE_END_COL", "P"),
            grade_col:          read_env_str("QUIZ_GRADE_COL", "Q"),
        };

        let grader = GraderConfig {
            passing_grade:   read_env_u32("GRADER_PASSING_GRADE", 80),
            badge_name:      read_env_str("GRADER_BADGE_NAME", "Smart Developer"),
            min_interval:    read_interval_secs("GRADER_MIN_INTERVAL_SECONDS", 300),
            passed_template: PathBuf::from(read_env_str("GRADER_PASSED_TEMPLATE", "./passed.md")),
            failed_template: PathBuf::from(read_env_str("GRADER_FAILED_TEMPLATE", "./failed.md")),
        };

        let discourse = DiscourseConfig {
            host:         require_env("DISCOURSE_HOST")?,
            api_username: require_env("DISCOURSE_API_USERNAME")?,
            api_key:      require_env("DISCOURSE_API_KEY")?,
        };

        let http_client = Client::builder()
            .build()
            .context("Failed to construct shared HTTP client")?;

        Ok(Self {
            sheet,
            grader,
            discourse,
            http_client,
        })
    }

    /// Returns the quiz spreadsheet configuration.
    pub fn sheet(&self) -> &SheetConfig {
        &self.sheet
    }

    /// Returns the grading and notification settings.
    pub fn grader(&self) -> &GraderConfig {
        &self.grader
    }

    /// Returns the Discourse credentials.
    pub fn discourse(&self) -> &DiscourseConfig {
        &self.discourse
    }

    /// Returns a clone of the shared reqwest HTTP client.
    pub fn http_client(&self) -> Client {
        self.http_client.clone()
    }
}

/// Shared configuration handle used throughout the crate.
#[derive(Clone)]
pub struct ConfigHandle(Arc<ConfigState>);

impl std::ops::Deref for ConfigHandle {
    type Target = ConfigState;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Global storage for the lazily constructed configuration state.
static CONFIG_SLOT: OnceLock<Mutex<Option<Arc<ConfigState>>>> = OnceLock::new();

/// Returns the mutex guarding the global configuration slot.
fn slot() -> &'static Mutex<Option<Arc<ConfigState>>> {
    CONFIG_SLOT.get_or_init(|| Mutex::new(None))
}

/// Ensure the global configuration has been initialized and return a handle.
pub fn ensure_initialized() -> Result<ConfigHandle> {
    let slot = slot();
    let mut guard = slot.lock().expect("config slot poisoned");
    if let Some(cfg) = guard.as_ref() {
        return Ok(ConfigHandle(Arc::clone(cfg)));
    }

    let cfg = ConfigState::new().map(Arc::new)?;
    *guard = Some(Arc::clone(&cfg));
    Ok(ConfigHandle(cfg))
}

/// Reads a required environment variable, trimmed.
fn require_env(env: &str) -> Result<String> {
    std::env::var(env)
        .map(|value| value.trim().to_owned())
        .with_context(|| format!("{env} is not set"))
}

/// Reads an environment variable, falling back to `default` when missing.
fn read_env_str(env: &str, default: &str) -> String {
    std::env::var(env)
        .map(|value| value.trim().to_owned())
        .unwrap_or_else(|_| default.to_string())
}

/// Parses an environment variable as `u32`, falling back to `default` when
/// parsing fails or the variable is missing.
fn read_env_u32(env: &str, default: u32) -> u32 {
    std::env::var(env)
        .ok()
        .and_then(|value| value.parse::<u32>().ok())
        .unwrap_or(default)
}

/// Parses an environment variable into a `Duration`, falling back to
/// `default_secs` when parsing fails or the variable is missing.
fn read_interval_secs(env: &str, default_secs: u64) -> Duration {
    std::env::var(env)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or_else(|| Duration::from_secs(default_secs))
}
