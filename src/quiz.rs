#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! The grading pipeline for quiz submissions.
//!
//! The spreadsheet holds one key row of correct answers and, below it, one
//! row per submission. Grading walks the submission rows in order, skips any
//! row whose grade cell is already set, scores the rest against the key,
//! checks the issue and pull-request URLs, writes the grade back, and queues
//! the outcome for notification. Re-running the pipeline is cheap and safe:
//! the grade cell is the only record of what has been processed.

use std::sync::LazyLock;

use anyhow::ensure;
use regex::Regex;
use tokio::sync::mpsc;
use typed_builder::TypedBuilder;

use crate::{
    columns,
    config::SheetConfig,
    sheets::SheetStore,
};

/// Last sheet row scanned for submissions.
const LAST_ENTRY_ROW: u32 = 1000;

/// Pattern a claimed issue URL must match.
static ISSUE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https?://issues\.openmrs\.org/browse/").expect("issue URL pattern")
});

/// Pattern a submitted pull-request URL must match.
static PULL_REQUEST_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https://github\.com/openmrs/.*/pull/\d+").expect("pull request URL pattern")
});

/// Resolved positions of the named spreadsheet columns.
#[derive(Debug, Clone)]
pub struct SheetLayout {
    /// Row containing the correct answers.
    key_row:            u32,
    /// Row in which responses start.
    response_start_row: u32,
    /// Index of the respondent-name column.
    name:               usize,
    /// Index of the OpenMRS ID column.
    openmrs_id:         usize,
    /// Index of the email column.
    email:              usize,
    /// Index of the issue-URL column.
    issue:              usize,
    /// Index of the pull-request-URL column.
    pull_request:       usize,
    /// Index of the first answer column.
    response_start:     usize,
    /// Index of the last answer column.
    response_end:       usize,
    /// Index of the grade column.
    grade:              usize,
}

impl SheetLayout {
    /// Resolves the configured column letters into indices.
    pub fn from_config(config: &SheetConfig) -> anyhow::Result<Self> {
        let response_start = columns::index(&config.response_start_col)?;
        let response_end = columns::index(&config.response_end_col)?;
        ensure!(
            response_start <= response_end,
            "Response columns are reversed: {} comes after {}",
            config.response_start_col,
            config.response_end_col
        );

        Ok(Self {
            key_row: config.key_row,
            response_start_row: config.response_start_row,
            name: columns::index(&config.name_col)?,
            openmrs_id: columns::index(&config.openmrs_id_col)?,
            email: columns::index(&config.email_col)?,
            issue: columns::index(&config.issue_col)?,
            pull_request: columns::index(&config.pull_request_col)?,
            response_start,
            response_end,
            grade: columns::index(&config.grade_col)?,
        })
    }
}

/// One respondent's extracted submission.
#[derive(Debug, Clone, PartialEq, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct Entry {
    /// Respondent's name.
    pub name:         String,
    /// Respondent's email.
    pub email:        String,
    /// Respondent's OpenMRS ID, normalized for badge and message calls.
    pub openmrs_id:   String,
    /// URL of the issue claimed.
    pub issue:        String,
    /// URL of the pull request submitted.
    pub pull_request: String,
    /// Answers, aligned positionally with the key.
    pub responses:    Vec<String>,
    /// Grade cell value, if one has been written.
    #[builder(default)]
    pub grade:        Option<String>,
}

impl Entry {
    /// Builds an `Entry` from one sheet row. Missing cells propagate as
    /// empty values; extraction itself never fails.
    pub fn from_row(row: &[String], layout: &SheetLayout) -> Self {
        let grade = columns::cell(row, layout.grade);
        Self {
            name:         columns::cell(row, layout.name),
            email:        columns::cell(row, layout.email),
            openmrs_id:   normalize_openmrs_id(&columns::cell(row, layout.openmrs_id)),
            issue:        columns::cell(row, layout.issue),
            pull_request: columns::cell(row, layout.pull_request),
            responses:    columns::cells(row, layout.response_start, layout.response_end),
            grade:        if grade.is_empty() { None } else { Some(grade) },
        }
    }

    /// Whether this entry has already been graded. The grade cell is the
    /// sole record of that, so a non-empty value means the row is done.
    pub fn is_graded(&self) -> bool {
        matches!(&self.grade, Some(grade) if !grade.is_empty())
    }
}

/// Normalizes an OpenMRS ID: lowercased, with spaces and `@` removed, so
/// "@Jane Doe" and "janedoe" address the same Discourse user.
fn normalize_openmrs_id(raw: &str) -> String {
    raw.chars()
        .filter(|c| !matches!(c, '@' | ' '))
        .collect::<String>()
        .to_lowercase()
}

/// Whether the entry claims a recognizable issue-tracker URL. A miss is
/// logged against the respondent; an empty value is a miss.
pub fn has_valid_issue(entry: &Entry) -> bool {
    let valid = !entry.issue.is_empty() && ISSUE_URL.is_match(&entry.issue);
    if !valid {
        tracing::info!(
            "Entry for {} has invalid issue URL (\"{}\" does not match \"{}\")",
            entry.openmrs_id,
            entry.issue,
            ISSUE_URL.as_str()
        );
    }
    valid
}

/// Whether the entry points at a pull request in the openmrs organization.
/// A miss is logged against the respondent; an empty value is a miss.
pub fn has_valid_pull_request(entry: &Entry) -> bool {
    let valid = !entry.pull_request.is_empty() && PULL_REQUEST_URL.is_match(&entry.pull_request);
    if !valid {
        tracing::info!(
            "Entry for {} has invalid pull request URL (\"{}\" does not match \"{}\")",
            entry.openmrs_id,
            entry.pull_request,
            PULL_REQUEST_URL.as_str()
        );
    }
    valid
}

/// Counts positions where the response equals the key value, using exact
/// string equality, and returns `floor(correct / key.len() * 100)`.
///
/// Callers must guarantee a non-empty key.
pub fn score_responses(key: &[String], responses: &[String]) -> u32 {
    let correct = key
        .iter()
        .zip(responses.iter())
        .filter(|(expected, given)| expected == given)
        .count();

    (correct * 100 / key.len()) as u32
}

/// Outcome of grading one entry, queued for notification dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct GradeResult {
    /// Normalized OpenMRS ID of the respondent.
    pub openmrs_id:    String,
    /// Percentage grade after the override policy, 0 to 100.
    pub numeric_grade: u32,
    /// Value written to the grade cell.
    pub display_grade: String,
}

/// Scores one entry against the key and applies the URL override policy:
/// an invalid issue URL forces "Invalid Issue" and 0, then an invalid pull
/// request URL forces "Invalid PR" and 0; otherwise the grade is the raw
/// percentage.
pub fn grade_entry(key: &[String], entry: &Entry) -> GradeResult {
    let mut numeric_grade = score_responses(key, &entry.responses);
    let mut display_grade = format!("{numeric_grade}%");

    let issue_valid = has_valid_issue(entry);
    let pull_request_valid = has_valid_pull_request(entry);
    if !issue_valid {
        display_grade = "Invalid Issue".to_string();
        numeric_grade = 0;
    } else if !pull_request_valid {
        display_grade = "Invalid PR".to_string();
        numeric_grade = 0;
    }

    GradeResult {
        openmrs_id: entry.openmrs_id.clone(),
        numeric_grade,
        display_grade,
    }
}

/// An enum to represent possible errors during a grading run
#[derive(thiserror::Error, Debug)]
pub enum GradeError {
    /// The answer key or the submission rows could not be read.
    #[error("Something went wrong while reading the quiz sheet")]
    Fetch {
        /// Description of the read that failed.
        detail: String,
    },
    /// A computed grade could not be written back; the run stops here and
    /// the remaining rows wait for the next trigger.
    #[error("Something went wrong while recording a grade")]
    Persist {
        /// Sheet row the write targeted.
        row:    u32,
        /// Description of the write failure.
        detail: String,
    },
    /// Unknown error
    #[error(transparent)]
    Unknown(#[from] anyhow::Error),
}

/// Access to one quiz spreadsheet: the key, the submissions, and the grades
/// written back.
pub struct Quiz<S> {
    /// Store the spreadsheet lives in.
    store:  S,
    /// Resolved column positions.
    layout: SheetLayout,
}

impl<S: SheetStore> Quiz<S> {
    /// Creates a quiz over `store` using `layout`.
    pub fn new(store: S, layout: SheetLayout) -> Self {
        Self { store, layout }
    }

    /// Reads the answer key: the response-range slice of the key row.
    pub async fn answer_key(&self) -> Result<Vec<String>, GradeError> {
        let row = self
            .store
            .read_row(self.layout.key_row)
            .await
            .map_err(|err| GradeError::Fetch {
                detail: format!("key row {}: {err:#}", self.layout.key_row),
            })?;

        Ok(columns::cells(
            &row,
            self.layout.response_start,
            self.layout.response_end,
        ))
    }

    /// Reads all submission rows, bounded at row [`LAST_ENTRY_ROW`].
    pub async fn entries(&self) -> Result<Vec<Vec<String>>, GradeError> {
        self.store
            .read_range(self.layout.response_start_row, LAST_ENTRY_ROW)
            .await
            .map_err(|err| GradeError::Fetch {
                detail: format!(
                    "rows {}:{LAST_ENTRY_ROW}: {err:#}",
                    self.layout.response_start_row
                ),
            })
    }

    /// Grades all entries that have not yet been graded, sending a
    /// [`GradeResult`] for each one to `outcomes`.
    ///
    /// Rows are processed in order, one at a time, and each grade is
    /// persisted before its outcome is queued. A failed write aborts the
    /// run; rows already handled stay graded and everything after the
    /// failing row is picked up again by the next trigger.
    pub async fn grade(&self, outcomes: &mpsc::Sender<GradeResult>) -> Result<(), GradeError> {
        let key = self.answer_key().await?;
        if key.iter().all(String::is_empty) {
            return Err(GradeError::Fetch {
                detail: format!("key row {} is empty", self.layout.key_row),
            });
        }

        let rows = self.entries().await?;
        for (offset, row) in rows.iter().enumerate() {
            let entry = Entry::from_row(row, &self.layout);
            if entry.is_graded() {
                continue;
            }

            let result = grade_entry(&key, &entry);
            let row_index = self.layout.response_start_row + offset as u32;
            self.store
                .write_cell(
                    row_index,
                    &columns::letter(self.layout.grade),
                    &result.display_grade,
                )
                .await
                .map_err(|err| GradeError::Persist {
                    row:    row_index,
                    detail: format!("{err:#}"),
                })?;

            if outcomes.send(result).await.is_err() {
                tracing::warn!(
                    "Notification channel closed; outcome for row {row_index} dropped"
                );
            }
        }

        Ok(())
    }

    /// Confirms the spreadsheet is reachable by reading one arbitrary cell.
    pub async fn verify(&self) -> anyhow::Result<()> {
        let cell = self.store.read_cell("A1").await?;
        ensure!(cell.is_some(), "Unable to read spreadsheet.");
        Ok(())
    }
}
