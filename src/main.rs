#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! # quizgrader
//!
//! Server and CLI to grade and process /dev/1 quiz entries. Entries are
//! copied to a Google Spreadsheet; the server scans the spreadsheet for any
//! entries that have not been graded and, if found, grades them and notifies
//! the respondent of the result (granting the appropriate badge on
//! Discourse if they passed).

use std::sync::Arc;

use anyhow::{Context, Result};
use bpaf::*;
use dotenvy::dotenv;
use quizgrader::{
    config::{self, ConfigHandle},
    discourse::{DiscourseClient, Forum},
    grader::{Dispatcher, Grader, RESULT_QUEUE_CAPACITY, Templates},
    quiz::{GradeResult, Quiz, SheetLayout},
    server,
    sheets::SheetsClient,
};
use tokio::sync::mpsc;
use tracing::{Level, metadata::LevelFilter};
use tracing_subscriber::{fmt, prelude::*, util::SubscriberInitExt};

/// Top-level CLI commands.
#[derive(Debug, Clone)]
enum Cmd {
    /// Run the HTTP trigger surface
    Serve(u16),
    /// Grade any ungraded entries once; the flag bypasses notification
    Grade(bool),
    /// Verify the spreadsheet and Discourse connections
    Verify,
}

/// Parse the command line arguments and return a `Cmd` enum
fn options() -> Cmd {
    /// parses the listen port
    fn port() -> impl Parser<u16> {
        long("port")
            .env("PORT")
            .help("Port for the trigger surface")
            .argument::<u16>("PORT")
            .fallback(8080)
    }

    /// parses the notification bypass switch
    fn dry_run() -> impl Parser<bool> {
        long("dry-run")
            .help("Log outcomes instead of notifying respondents")
            .switch()
    }

    let serve = construct!(Cmd::Serve(port()))
        .to_options()
        .command("serve")
        .help("Run the grading server");

    let grade = construct!(Cmd::Grade(dry_run()))
        .to_options()
        .command("grade")
        .help("Grade any ungraded entries once and exit");

    let verify = pure(Cmd::Verify)
        .to_options()
        .command("verify")
        .help("Verify the spreadsheet and Discourse connections");

    let cmd = construct!([serve, grade, verify]);

    cmd.to_options().descr("Quiz grading service").run()
}

/// Builds the quiz over the configured spreadsheet.
fn build_quiz(config: &ConfigHandle) -> Result<Quiz<SheetsClient>> {
    let sheet = config.sheet();
    let layout = SheetLayout::from_config(sheet)?;
    let store = SheetsClient::new(sheet.clone(), config.http_client());
    Ok(Quiz::new(store, layout))
}

/// Builds the Discourse client from the configured credentials.
fn build_forum(config: &ConfigHandle) -> Arc<DiscourseClient> {
    Arc::new(DiscourseClient::new(
        config.discourse().clone(),
        config.http_client(),
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let fmt = fmt::layer()
        .without_time()
        .with_file(false)
        .with_line_number(false);
    let filter_layer = LevelFilter::from_level(Level::INFO);
    tracing_subscriber::registry()
        .with(fmt)
        .with(filter_layer)
        .init();

    let cmd = options();
    let config = config::ensure_initialized()?;

    match cmd {
        Cmd::Serve(port) => {
            let quiz = build_quiz(&config)?;
            let forum = build_forum(&config);
            let settings = config.grader();
            let templates = Templates::load(&settings.passed_template, &settings.failed_template);
            let grader = Arc::new(Grader::new(quiz, forum, settings, templates));
            server::serve(grader, port).await?;
        }
        Cmd::Grade(true) => {
            let quiz = build_quiz(&config)?;
            let (outcomes, mut results) = mpsc::channel::<GradeResult>(RESULT_QUEUE_CAPACITY);
            let logger = tokio::spawn(async move {
                while let Some(result) = results.recv().await {
                    tracing::debug!(
                        "Bypassed badge or notification for: {} ({})",
                        result.openmrs_id,
                        result.numeric_grade
                    );
                }
            });

            quiz.grade(&outcomes).await?;
            drop(outcomes);
            logger.await.context("Outcome logger stopped early")?;
        }
        Cmd::Grade(false) => {
            let quiz = build_quiz(&config)?;
            let forum = build_forum(&config);
            let settings = config.grader();
            let templates = Templates::load(&settings.passed_template, &settings.failed_template);
            let dispatcher = Dispatcher::new(
                forum,
                templates,
                settings.badge_name.clone(),
                settings.passing_grade,
            );
            let (outcomes, results) = mpsc::channel(RESULT_QUEUE_CAPACITY);
            let worker = tokio::spawn(async move { dispatcher.run(results).await });

            quiz.grade(&outcomes).await?;
            drop(outcomes);
            worker.await.context("Dispatcher stopped early")?;
        }
        Cmd::Verify => {
            let quiz = build_quiz(&config)?;
            let forum = build_forum(&config);
            quiz.verify().await?;
            forum.verify().await?;
            println!("ok");
        }
    }

    Ok(())
}
