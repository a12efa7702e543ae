//! Discourse API client used to notify respondents.
//!
//! Authentication follows the admin-API convention of passing `api_key` and
//! `api_username` with every request. Messages are sent as private-message
//! posts. The [`Forum`] trait is the seam the notification dispatcher
//! depends on.

use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::config::DiscourseConfig;

/// A Discourse user record.
#[derive(Debug, Clone, Deserialize)]
pub struct User {
    /// Numeric user id.
    pub id:       u64,
    /// Username the record belongs to.
    pub username: String,
}

/// A Discourse badge definition.
#[derive(Debug, Clone, Deserialize)]
pub struct Badge {
    /// Numeric badge id, needed to grant the badge.
    pub id:   u64,
    /// Display name of the badge.
    pub name: String,
}

/// The notification service the grading pipeline talks to.
#[async_trait]
pub trait Forum: Send + Sync {
    /// Fetches a user record by username.
    async fn get_user(&self, username: &str) -> Result<User>;

    /// Looks up a badge definition by name, matching case-insensitively.
    async fn get_badge(&self, name: &str) -> Result<Option<Badge>>;

    /// Grants a badge to a user.
    async fn grant_badge(&self, username: &str, badge_id: u64) -> Result<()>;

    /// Sends a private message to a user.
    async fn send_message(&self, username: &str, subject: &str, body: &str) -> Result<()>;

    /// Confirms the service is reachable by fetching the API user's own
    /// record.
    async fn verify(&self) -> Result<()>;
}

/// Envelope around a single user record.
#[derive(Debug, Deserialize)]
struct UserResponse {
    /// The requested user.
    user: User,
}

/// Envelope around the badge catalog.
#[derive(Debug, Deserialize)]
struct BadgeList {
    /// All badge definitions on the instance.
    badges: Vec<Badge>,
}

/// Client for the Discourse API.
pub struct DiscourseClient {
    /// Shared HTTP client.
    client: Client,
    /// Host and credentials.
    config: DiscourseConfig,
}

impl DiscourseClient {
    /// Creates a client for the configured Discourse instance.
    pub fn new(config: DiscourseConfig, client: Client) -> Self {
        Self { client, config }
    }

    /// Returns the full URL for `path` on the configured host.
    fn url(&self, path: &str) -> String {
        format!("https://{}{}", self.config.host, path)
    }

    /// Returns the authentication query parameters sent with every request.
    fn auth(&self) -> [(&'static str, &str); 2] {
        [
            ("api_key", self.config.api_key.as_str()),
            ("api_username", self.config.api_username.as_str()),
        ]
    }
}

#[async_trait]
impl Forum for DiscourseClient {
    async fn get_user(&self, username: &str) -> Result<User> {
        let resp = self
            .client
            .get(self.url(&format!("/users/{username}.json")))
            .query(&self.auth())
            .send()
            .await
            .with_context(|| format!("Could not fetch user {username}"))?
            .error_for_status()
            .with_context(|| format!("Discourse rejected user lookup for {username}"))?
            .json::<UserResponse>()
            .await
            .with_context(|| format!("Could not parse user response for {username}"))?;

        Ok(resp.user)
    }

    async fn get_badge(&self, name: &str) -> Result<Option<Badge>> {
        let resp = self
            .client
            .get(self.url("/badges.json"))
            .query(&self.auth())
            .send()
            .await
            .context("Could not fetch badges")?
            .error_for_status()
            .context("Discourse rejected badge lookup")?
            .json::<BadgeList>()
            .await
            .context("Could not parse badges response")?;

        Ok(resp
            .badges
            .into_iter()
            .find(|badge| badge.name.eq_ignore_ascii_case(name)))
    }

    async fn grant_badge(&self, username: &str, badge_id: u64) -> Result<()> {
        self.client
            .post(self.url("/user_badges.json"))
            .query(&self.auth())
            .query(&[
                ("badge_id", badge_id.to_string().as_str()),
                ("username", username),
            ])
            .send()
            .await
            .with_context(|| format!("Could not grant badge {badge_id} to {username}"))?
            .error_for_status()
            .with_context(|| format!("Discourse rejected badge grant for {username}"))?;

        Ok(())
    }

    async fn send_message(&self, username: &str, subject: &str, body: &str) -> Result<()> {
        self.client
            .post(self.url("/posts.json"))
            .query(&self.auth())
            .query(&[
                ("archetype", "private_message"),
                ("title", subject),
                ("raw", body),
                ("target_usernames", username),
            ])
            .send()
            .await
            .with_context(|| format!("Could not send message to {username}"))?
            .error_for_status()
            .with_context(|| format!("Discourse rejected message to {username}"))?;

        Ok(())
    }

    async fn verify(&self) -> Result<()> {
        self.get_user(&self.config.api_username).await?;
        Ok(())
    }
}

/// Everything a [`RecordingForum`] has been asked to do.
#[derive(Default)]
struct ForumState {
    /// Badges the instance pretends to define.
    badges:        Vec<Badge>,
    /// Badge names looked up, in order.
    badge_lookups: Vec<String>,
    /// Badge grants performed, as `(username, badge_id)`.
    grants:        Vec<(u64, String)>,
    /// Messages sent, as `(username, subject, body)`.
    messages:      Vec<(String, String, String)>,
}

/// Recording implementation of [`Forum`] for tests.
///
/// Clones share the same state, so a test can hand one clone to the
/// dispatcher and inspect the other afterwards.
#[derive(Clone, Default)]
pub struct RecordingForum {
    /// Shared recorded state.
    inner: Arc<Mutex<ForumState>>,
}

impl RecordingForum {
    /// Creates a forum with no badges defined.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a badge definition the forum will report.
    pub fn with_badge(self, id: u64, name: &str) -> Self {
        self.inner
            .lock()
            .expect("forum state poisoned")
            .badges
            .push(Badge {
                id,
                name: name.to_string(),
            });
        self
    }

    /// Returns the badge names looked up so far.
    pub fn badge_lookups(&self) -> Vec<String> {
        self.inner
            .lock()
            .expect("forum state poisoned")
            .badge_lookups
            .clone()
    }

    /// Returns the badge grants performed so far.
    pub fn grants(&self) -> Vec<(u64, String)> {
        self.inner.lock().expect("forum state poisoned").grants.clone()
    }

    /// Returns the messages sent so far.
    pub fn messages(&self) -> Vec<(String, String, String)> {
        self.inner
            .lock()
            .expect("forum state poisoned")
            .messages
            .clone()
    }
}

#[async_trait]
impl Forum for RecordingForum {
    async fn get_user(&self, username: &str) -> Result<User> {
        Ok(User {
            id: 1,
            username: username.to_string(),
        })
    }

    async fn get_badge(&self, name: &str) -> Result<Option<Badge>> {
        let mut state = self.inner.lock().expect("forum state poisoned");
        state.badge_lookups.push(name.to_string());
        Ok(state
            .badges
            .iter()
            .find(|badge| badge.name.eq_ignore_ascii_case(name))
            .cloned())
    }

    async fn grant_badge(&self, username: &str, badge_id: u64) -> Result<()> {
        self.inner
            .lock()
            .expect("forum state poisoned")
            .grants
            .push((badge_id, username.to_string()));
        Ok(())
    }

    async fn send_message(&self, username: &str, subject: &str, body: &str) -> Result<()> {
        self.inner
            .lock()
            .expect("forum state poisoned")
            .messages
            .push((username.to_string(), subject.to_string(), body.to_string()));
        Ok(())
    }

    async fn verify(&self) -> Result<()> {
        Ok(())
    }
}
