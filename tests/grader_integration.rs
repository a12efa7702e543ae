use std::sync::Arc;

use quizgrader::{
    config::SheetConfig,
    discourse::RecordingForum,
    grader::{Dispatcher, Templates},
    quiz::{GradeError, Quiz, SheetLayout},
    sheets::InMemorySheet,
};
use tokio::sync::mpsc;

const ISSUE: &str = "https://issues.openmrs.org/browse/TRUNK-1";
const PULL_REQUEST: &str = "https://github.com/openmrs/openmrs-core/pull/42";

/// Layout used throughout: name A, OpenMRS ID B, email C, issue D, pull
/// request E, responses F:G, grade H, key on row 2, responses from row 3.
fn test_layout() -> SheetLayout {
    let config = SheetConfig {
        spreadsheet_id: "quiz".to_string(),
        endpoint: String::new(),
        token: String::new(),
        key_row: 2,
        name_col: "A".to_string(),
        openmrs_id_col: "B".to_string(),
        email_col: "C".to_string(),
        issue_col: "D".to_string(),
        pull_request_col: "E".to_string(),
        response_start_row: 3,
        response_start_col: "F".to_string(),
        response_end_col: "G".to_string(),
        grade_col: "H".to_string(),
    };
    SheetLayout::from_config(&config).expect("layout should resolve")
}

fn key_row() -> Vec<&'static str> {
    vec!["", "", "", "", "", "a", "b"]
}

fn submission(openmrs_id: &'static str, r1: &'static str, r2: &'static str) -> Vec<&'static str> {
    vec!["Jane Doe", openmrs_id, "jane@example.com", ISSUE, PULL_REQUEST, r1, r2]
}

/// Grades the sheet and dispatches every outcome, waiting for the
/// dispatcher to drain before returning.
async fn run_pipeline(
    sheet: &InMemorySheet,
    forum: &RecordingForum,
    passing_grade: u32,
) -> Result<(), GradeError> {
    let quiz = Quiz::new(sheet.clone(), test_layout());
    let templates = Templates {
        passed: "passed body".to_string(),
        failed: "failed body".to_string(),
    };
    let dispatcher = Dispatcher::new(
        Arc::new(forum.clone()),
        templates,
        "Smart Developer".to_string(),
        passing_grade,
    );

    let (outcomes, results) = mpsc::channel(8);
    let worker = tokio::spawn(async move { dispatcher.run(results).await });
    let run = quiz.grade(&outcomes).await;
    drop(outcomes);
    worker.await.expect("dispatcher should not panic");
    run
}

#[tokio::test]
async fn a_passing_entry_is_persisted_badged_and_congratulated() {
    let sheet = InMemorySheet::with_rows([
        vec!["header"],
        key_row(),
        submission("@Jane Doe", "a", "b"),
    ]);
    let forum = RecordingForum::new().with_badge(7, "Smart Developer");

    run_pipeline(&sheet, &forum, 70)
        .await
        .expect("the run should succeed");

    assert_eq!(sheet.cell(3, "H"), "100%");
    assert_eq!(forum.grants(), vec![(7, "janedoe".to_string())]);

    let messages = forum.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].0, "janedoe");
    assert_eq!(messages[0].1, "Congratulations Smart Developer!");
    assert_eq!(messages[0].2, "passed body");
}

#[tokio::test]
async fn a_failing_entry_gets_only_the_failure_message() {
    let sheet = InMemorySheet::with_rows([
        vec!["header"],
        key_row(),
        submission("@Jane Doe", "a", "x"),
    ]);
    let forum = RecordingForum::new().with_badge(7, "Smart Developer");

    run_pipeline(&sheet, &forum, 70)
        .await
        .expect("the run should succeed");

    assert_eq!(sheet.cell(3, "H"), "50%");
    assert!(forum.badge_lookups().is_empty());
    assert!(forum.grants().is_empty());

    let messages = forum.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].0, "janedoe");
    assert_eq!(messages[0].1, "You did not pass the /dev/1 quiz");
    assert_eq!(messages[0].2, "failed body");
}

#[tokio::test]
async fn graded_rows_are_left_untouched_and_not_renotified() {
    let mut graded = submission("@Jane Doe", "a", "b");
    graded.push("66%");
    let sheet = InMemorySheet::with_rows([vec!["header"], key_row(), graded]);
    let forum = RecordingForum::new().with_badge(7, "Smart Developer");

    run_pipeline(&sheet, &forum, 70)
        .await
        .expect("the run should succeed");

    assert_eq!(sheet.cell(3, "H"), "66%");
    assert_eq!(sheet.writes(), 0);
    assert!(forum.badge_lookups().is_empty());
    assert!(forum.grants().is_empty());
    assert!(forum.messages().is_empty());
}

#[tokio::test]
async fn only_ungraded_rows_are_processed() {
    let mut first = submission("@Jane Doe", "a", "b");
    first.push("100%");
    let second = submission("@John Doe", "a", "x");
    let sheet = InMemorySheet::with_rows([vec!["header"], key_row(), first, second]);
    let forum = RecordingForum::new().with_badge(7, "Smart Developer");

    run_pipeline(&sheet, &forum, 70)
        .await
        .expect("the run should succeed");

    assert_eq!(sheet.cell(3, "H"), "100%");
    assert_eq!(sheet.cell(4, "H"), "50%");
    assert_eq!(sheet.writes(), 1);

    let messages = forum.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].0, "johndoe");
}

#[tokio::test]
async fn a_failed_write_aborts_the_rest_of_the_run() {
    let sheet = InMemorySheet::with_rows([
        vec!["header"],
        key_row(),
        submission("@Jane Doe", "a", "b"),
        submission("@John Doe", "a", "b"),
    ]);
    sheet.set_fail_writes(true);
    let forum = RecordingForum::new().with_badge(7, "Smart Developer");

    let err = run_pipeline(&sheet, &forum, 70)
        .await
        .expect_err("the first write must abort the run");

    assert!(matches!(err, GradeError::Persist { row: 3, .. }));
    assert_eq!(sheet.writes(), 0);
    assert!(forum.grants().is_empty());
    assert!(forum.messages().is_empty());
}

#[tokio::test]
async fn a_missing_badge_is_swallowed_after_the_grade_is_persisted() {
    let sheet = InMemorySheet::with_rows([
        vec!["header"],
        key_row(),
        submission("@Jane Doe", "a", "b"),
    ]);
    let forum = RecordingForum::new();

    run_pipeline(&sheet, &forum, 70)
        .await
        .expect("notification failures must not fail the run");

    assert_eq!(sheet.cell(3, "H"), "100%");
    assert_eq!(forum.badge_lookups(), vec!["Smart Developer".to_string()]);
    assert!(forum.grants().is_empty());
    assert!(forum.messages().is_empty());
}
