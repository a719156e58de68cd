//! ClickUp chat target
//!
//! Posts to a Chat v3 channel. When that fails and a fallback task is
//! configured, the message goes out as a v2 task comment instead.

use super::{PublishError, PublishTarget};
use crate::config::ClickUpChatConfig;
use crate::credentials::{Credential, CredentialProvider};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::json;
use std::sync::Arc;

/// Credential used to post
pub const INTEGRATION: &str = "clickup";

pub struct ClickUpChatTarget {
    client: Client,
    config: ClickUpChatConfig,
    credentials: Arc<CredentialProvider>,
}

impl ClickUpChatTarget {
    pub fn new(config: ClickUpChatConfig, credentials: Arc<CredentialProvider>) -> Self {
        Self {
            client: Client::new(),
            config,
            credentials,
        }
    }

    fn base(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    async fn post_chat(&self, content: &str, credential: &Credential) -> Result<(), PublishError> {
        if self.config.workspace_id.is_empty() || self.config.channel_id.is_empty() {
            return Err(PublishError::Config(
                "workspace_id and channel_id are required for chat".into(),
            ));
        }

        let url = format!(
            "{}/api/v3/workspaces/{}/chat/channels/{}/messages",
            self.base(),
            urlencoding::encode(&self.config.workspace_id),
            urlencoding::encode(&self.config.channel_id)
        );
        let response = self
            .client
            .post(url)
            .bearer_auth(&credential.secret)
            .json(&json!({
                "type": "message",
                "content_format": "text/md",
                "content": content,
            }))
            .send()
            .await?;

        expect_status(response, &[StatusCode::CREATED]).await
    }

    async fn post_comment(
        &self,
        task_id: &str,
        content: &str,
        credential: &Credential,
    ) -> Result<(), PublishError> {
        let url = format!(
            "{}/api/v2/task/{}/comment",
            self.base(),
            urlencoding::encode(task_id)
        );
        let response = self
            .client
            .post(url)
            .bearer_auth(&credential.secret)
            .json(&json!({ "comment_text": content }))
            .send()
            .await?;

        expect_status(response, &[StatusCode::OK, StatusCode::CREATED]).await
    }
}

async fn expect_status(
    response: reqwest::Response,
    accepted: &[StatusCode],
) -> Result<(), PublishError> {
    let status = response.status();
    if accepted.contains(&status) {
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    Err(PublishError::Rejected {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl PublishTarget for ClickUpChatTarget {
    fn name(&self) -> &str {
        "clickup_chat"
    }

    async fn post(&self, content: &str) -> Result<(), PublishError> {
        let credential = self.credentials.resolve(INTEGRATION).await?;

        match self.post_chat(content, &credential).await {
            Ok(()) => Ok(()),
            Err(e) => match &self.config.fallback_task_id {
                Some(task_id) => {
                    tracing::warn!(error = %e, task = %task_id, "Chat post failed, commenting on fallback task");
                    self.post_comment(task_id, content, &credential).await
                }
                None => Err(e),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SummaryStore;
    use mockito::{Matcher, Server};
    use std::collections::BTreeMap;

    fn target(base_url: String, fallback: Option<&str>) -> ClickUpChatTarget {
        let store = Arc::new(SummaryStore::open_in_memory().unwrap());
        store
            .save_credential(&Credential::api_key(INTEGRATION, "bot-token"))
            .unwrap();
        let credentials = Arc::new(CredentialProvider::new(store, &BTreeMap::new()));
        ClickUpChatTarget::new(
            ClickUpChatConfig {
                enabled: true,
                base_url,
                workspace_id: "9001".to_string(),
                channel_id: "chan-1".to_string(),
                fallback_task_id: fallback.map(str::to_string),
            },
            credentials,
        )
    }

    #[tokio::test]
    async fn test_posts_chat_message() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v3/workspaces/9001/chat/channels/chan-1/messages")
            .match_header("authorization", "Bearer bot-token")
            .match_body(Matcher::Json(json!({
                "type": "message",
                "content_format": "text/md",
                "content": "hello",
            })))
            .with_status(201)
            .with_body(r#"{"id": "m1"}"#)
            .create_async()
            .await;

        target(server.url(), None).post("hello").await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_falls_back_to_task_comment() {
        let mut server = Server::new_async().await;
        let _chat = server
            .mock("POST", "/api/v3/workspaces/9001/chat/channels/chan-1/messages")
            .with_status(403)
            .with_body(r#"{"err": "chat disabled"}"#)
            .create_async()
            .await;
        let comment = server
            .mock("POST", "/api/v2/task/abc/comment")
            .match_body(Matcher::Json(json!({ "comment_text": "hello" })))
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        target(server.url(), Some("abc")).post("hello").await.unwrap();
        comment.assert_async().await;
    }

    #[tokio::test]
    async fn test_rejected_without_fallback() {
        let mut server = Server::new_async().await;
        let _chat = server
            .mock("POST", "/api/v3/workspaces/9001/chat/channels/chan-1/messages")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let err = target(server.url(), None).post("hello").await.unwrap_err();
        assert!(matches!(err, PublishError::Rejected { status: 200, .. }));
    }
}
