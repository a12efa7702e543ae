#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Ties grading to notification: a throttled wakeup starts a grading run,
//! each graded entry's outcome is queued, and a dispatcher task drives the
//! badge grant and message for every respondent. Notification failures are
//! logged and never reach the grading run.

use std::{
    path::Path,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use futures::{StreamExt, stream::FuturesUnordered};
use tokio::sync::mpsc;

use crate::{
    config::GraderConfig,
    discourse::Forum,
    quiz::{GradeResult, Quiz},
    sheets::SheetStore,
};

/// Subject of the message sent to respondents who pass.
const PASSED_SUBJECT: &str = "Congratulations Smart Developer!";

/// Subject of the message sent to respondents who do not pass.
const FAILED_SUBJECT: &str = "You did not pass the /dev/1 quiz";

/// Grade results buffered between the grading run and the dispatcher.
pub const RESULT_QUEUE_CAPACITY: usize = 32;

/// Notification chains the dispatcher keeps in flight at once.
const MAX_IN_FLIGHT: usize = 8;

/// Minimum-interval gate deciding when a trigger may start a grading run.
///
/// This is a debounce, not a queue: triggers inside the interval are
/// dropped. The timestamp is recorded when a run is allowed, so a run
/// longer than the interval can be followed immediately by a fresh one.
pub struct Scheduler {
    /// When the last run was allowed to start.
    last_run:     Mutex<Option<Instant>>,
    /// Minimum time between runs.
    min_interval: Duration,
}

impl Scheduler {
    /// Creates a scheduler with the given minimum interval.
    pub fn new(min_interval: Duration) -> Self {
        Self {
            last_run: Mutex::new(None),
            min_interval,
        }
    }

    /// Whether a run may start at `now`. Records `now` as the run start
    /// when it answers yes.
    pub fn should_run(&self, now: Instant) -> bool {
        let mut last_run = self.last_run.lock().expect("scheduler state poisoned");
        match *last_run {
            Some(last) if now.duration_since(last) <= self.min_interval => false,
            _ => {
                *last_run = Some(now);
                true
            }
        }
    }
}

/// Message bodies sent to respondents after grading.
#[derive(Debug, Clone, Default)]
pub struct Templates {
    /// Body of the congratulations message.
    pub passed: String,
    /// Body of the did-not-pass message.
    pub failed: String,
}

impl Templates {
    /// Reads both template files. A file that cannot be read is logged and
    /// replaced with an empty body rather than stopping startup.
    pub fn load(passed: &Path, failed: &Path) -> Self {
        Self {
            passed: read_template(passed, "passed"),
            failed: read_template(failed, "failed"),
        }
    }
}

/// Reads one template file, logging and defaulting on failure.
fn read_template(path: &Path, which: &str) -> String {
    match std::fs::read_to_string(path) {
        Ok(body) => body,
        Err(err) => {
            tracing::error!("Failed to read {which} template {}: {err}", path.display());
            String::new()
        }
    }
}

/// Drives badge grants and messages for graded entries.
pub struct Dispatcher<F> {
    /// Forum the notifications go to.
    forum:         Arc<F>,
    /// Message bodies.
    templates:     Templates,
    /// Badge granted to respondents who pass.
    badge_name:    String,
    /// Minimum percentage considered a pass.
    passing_grade: u32,
}

impl<F: Forum> Dispatcher<F> {
    /// Creates a dispatcher notifying through `forum`.
    pub fn new(forum: Arc<F>, templates: Templates, badge_name: String, passing_grade: u32) -> Self {
        Self {
            forum,
            templates,
            badge_name,
            passing_grade,
        }
    }

    /// Consumes grade results until the channel closes, keeping at most
    /// [`MAX_IN_FLIGHT`] notification chains running at once, then drains
    /// whatever is still in flight.
    pub async fn run(&self, mut results: mpsc::Receiver<GradeResult>) {
        let mut in_flight = FuturesUnordered::new();

        loop {
            if in_flight.len() >= MAX_IN_FLIGHT {
                in_flight.next().await;
                continue;
            }

            tokio::select! {
                received = results.recv() => match received {
                    Some(result) => in_flight.push(self.dispatch(result)),
                    None => break,
                },
                Some(()) = in_flight.next(), if !in_flight.is_empty() => {}
            }
        }

        while in_flight.next().await.is_some() {}
    }

    /// Notifies one respondent of their result. Failures are logged here
    /// and go no further.
    async fn dispatch(&self, result: GradeResult) {
        if result.numeric_grade >= self.passing_grade {
            match self.congratulate(&result.openmrs_id).await {
                Ok(()) => {
                    tracing::info!("{} granted {}", result.openmrs_id, self.badge_name);
                }
                Err(err) => {
                    tracing::error!("Error granting badge to {}", result.openmrs_id);
                    tracing::error!("{err:#}");
                }
            }
        } else {
            let sent = self
                .forum
                .send_message(&result.openmrs_id, FAILED_SUBJECT, &self.templates.failed)
                .await;
            match sent {
                Ok(()) => {
                    tracing::info!("{} notified of failed quiz", result.openmrs_id);
                }
                Err(err) => {
                    tracing::error!("Error notifying {} of failed quiz", result.openmrs_id);
                    tracing::error!("{err:#}");
                }
            }
        }
    }

    /// Looks up the badge, grants it, and sends the congratulations
    /// message, in that order.
    async fn congratulate(&self, openmrs_id: &str) -> Result<()> {
        let badge = self
            .forum
            .get_badge(&self.badge_name)
            .await?
            .with_context(|| format!("No badge named {}", self.badge_name))?;
        self.forum.grant_badge(openmrs_id, badge.id).await?;
        self.forum
            .send_message(openmrs_id, PASSED_SUBJECT, &self.templates.passed)
            .await?;
        Ok(())
    }
}

/// The grading service: one quiz, one forum, a throttle, and the channel to
/// the notification dispatcher running on the runtime.
pub struct Grader<S, F> {
    /// The quiz being graded.
    quiz:      Arc<Quiz<S>>,
    /// Forum used for connection checks.
    forum:     Arc<F>,
    /// Wakeup throttle.
    scheduler: Scheduler,
    /// Queue into the dispatcher task.
    results:   mpsc::Sender<GradeResult>,
}

impl<S, F> Grader<S, F>
where
    S: SheetStore + 'static,
    F: Forum + 'static,
{
    /// Builds the grader and spawns its notification dispatcher.
    pub fn new(quiz: Quiz<S>, forum: Arc<F>, settings: &GraderConfig, templates: Templates) -> Self {
        let (results, receiver) = mpsc::channel(RESULT_QUEUE_CAPACITY);
        let dispatcher = Dispatcher::new(
            Arc::clone(&forum),
            templates,
            settings.badge_name.clone(),
            settings.passing_grade,
        );
        tokio::spawn(async move { dispatcher.run(receiver).await });

        Self {
            quiz: Arc::new(quiz),
            forum,
            scheduler: Scheduler::new(settings.min_interval),
            results,
        }
    }

    /// Triggers a grading run, unless one already ran within the minimum
    /// interval. The run proceeds on the runtime; the trigger returns
    /// immediately.
    pub fn wakeup(self: &Arc<Self>) {
        if !self.scheduler.should_run(Instant::now()) {
            return;
        }

        tracing::debug!("grading");
        let grader = Arc::clone(self);
        tokio::spawn(async move {
            match grader.quiz.grade(&grader.results).await {
                Ok(()) => tracing::debug!("grading completed"),
                Err(err) => tracing::error!("{err:#}"),
            }
        });
    }

    /// Confirms the spreadsheet and the forum are both reachable. The first
    /// failure short-circuits.
    pub async fn verify(&self) -> Result<()> {
        self.quiz.verify().await?;
        self.forum.verify().await?;
        tracing::debug!("connections verified");
        Ok(())
    }
}
