//! GitHub commit status client.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use tinyci_core::{CommitState, CommitStatus, Notifier, NotifyError};
use tracing::debug;

/// Longest description GitHub accepts for a commit status.
const MAX_DESCRIPTION_CHARS: usize = 140;

const STATUS_CONTEXT: &str = "tinyci";

#[derive(Debug, Serialize)]
struct StatusBody<'a> {
    state: CommitState,
    description: String,
    context: &'a str,
}

/// Publishes build outcomes through the GitHub commit status API.
pub struct GitHubNotifier {
    client: reqwest::Client,
    api_url: String,
    token: String,
}

impl GitHubNotifier {
    pub fn new(api_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    fn status_url(&self, status: &CommitStatus) -> String {
        format!(
            "{}/repos/{}/{}/statuses/{}",
            self.api_url, status.owner, status.repo, status.commit_sha
        )
    }
}

fn truncate_description(description: &str) -> String {
    description.chars().take(MAX_DESCRIPTION_CHARS).collect()
}

#[async_trait]
impl Notifier for GitHubNotifier {
    async fn notify(&self, status: &CommitStatus) -> Result<(), NotifyError> {
        let body = StatusBody {
            state: status.state,
            description: truncate_description(&status.description),
            context: STATUS_CONTEXT,
        };

        let response = self
            .client
            .post(self.status_url(status))
            .header("Authorization", format!("Bearer {}", self.token))
            .header("User-Agent", "tinyci")
            .header("Accept", "application/vnd.github+json")
            .json(&body)
            .send()
            .await
            .map_err(|e| NotifyError::Request(e.to_string()))?;

        if response.status() != StatusCode::CREATED {
            let code = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(NotifyError::Api {
                status: code,
                message: text,
            });
        }

        debug!(sha = %status.commit_sha, state = %status.state, "Published commit status");
        Ok(())
    }
}
