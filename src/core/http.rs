use crate::config::BackendConfig;
use crate::core::backend::{
    ChatBackend, ConversationPatch, SendMessageRequest, SendMessageResponse,
};
use crate::core::error::BackendError;
use crate::core::models::Conversation;
use async_trait::async_trait;
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Serialize)]
struct CreateConversationBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<String>,
}

/// JSON-over-HTTP Backend Chat Client
pub struct HttpChatBackend {
    client: Client,
    base_url: Url,
}

impl HttpChatBackend {
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;

        let base_url = Url::parse(config.base_url.trim_end_matches('/')).map_err(|e| {
            BackendError::Transport(format!("invalid base url '{}': {}", config.base_url, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(BackendError::Transport(format!(
                "base url '{}' cannot carry a path",
                config.base_url
            )));
        }

        Ok(Self { client, base_url })
    }

    /// Base URL with `segments` appended, each percent-encoded
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, BackendError> {
        let response = Self::check_status(response).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))
    }

    async fn check_status(response: Response) -> Result<Response, BackendError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        tracing::warn!("[HttpChatBackend] Backend returned {}: {}", status, body);
        Err(BackendError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl ChatBackend for HttpChatBackend {
    async fn list_conversations(&self) -> Result<Vec<Conversation>, BackendError> {
        let response = self.client.get(self.url(&["conversations"])).send().await?;
        Self::decode(response).await
    }

    async fn send_message(
        &self,
        request: SendMessageRequest,
    ) -> Result<SendMessageResponse, BackendError> {
        tracing::debug!(
            "[HttpChatBackend] Sending message (conversation {:?}, mode {})",
            request.conversation_id,
            request.mode
        );
        let response = self
            .client
            .post(self.url(&["chat"]))
            .json(&request)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn create_conversation(
        &self,
        title: Option<String>,
    ) -> Result<Conversation, BackendError> {
        let response = self
            .client
            .post(self.url(&["conversations"]))
            .json(&CreateConversationBody { title })
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn delete_conversation(&self, id: &str) -> Result<(), BackendError> {
        let response = self
            .client
            .delete(self.url(&["conversations", id]))
            .send()
            .await?;
        Self::check_status(response).await?;
        Ok(())
    }

    async fn update_conversation(
        &self,
        id: &str,
        patch: ConversationPatch,
    ) -> Result<Conversation, BackendError> {
        let response = self
            .client
            .patch(self.url(&["conversations", id]))
            .json(&patch)
            .send()
            .await?;
        Self::decode(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::Mode;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backend_for(server: &MockServer) -> HttpChatBackend {
        HttpChatBackend::new(&BackendConfig {
            base_url: format!("{}/api/", server.uri()),
            timeout_ms: 2_000,
            ..BackendConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_send_message_posts_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_json(json!({
                "message": "hi",
                "conversationId": "c1",
                "mode": "deepthink"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "message": {
                    "id": "m-2",
                    "content": "hello!",
                    "role": "assistant",
                    "timestamp": "2024-05-01T10:00:00Z"
                },
                "conversationId": "c1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let backend = backend_for(&server);
        let response = backend
            .send_message(SendMessageRequest {
                message: "hi".to_string(),
                conversation_id: Some("c1".to_string()),
                mode: Mode::Deepthink,
            })
            .await
            .unwrap();

        assert_eq!(response.conversation_id, "c1");
        assert_eq!(response.message.content, "hello!");
    }

    #[tokio::test]
    async fn test_error_status_is_tagged() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let backend = backend_for(&server);
        let err = backend
            .send_message(SendMessageRequest {
                message: "hi".to_string(),
                conversation_id: None,
                mode: Mode::Normal,
            })
            .await
            .unwrap_err();

        match err {
            BackendError::Status { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body, "overloaded");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_list_conversations_decodes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/conversations"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "id": "c1",
                "title": "Seeded",
                "messages": [],
                "mode": "research",
                "createdAt": "2024-05-01T10:00:00Z",
                "updatedAt": "2024-05-01T11:00:00Z"
            }])))
            .mount(&server)
            .await;

        let conversations = backend_for(&server).list_conversations().await.unwrap();
        assert_eq!(conversations.len(), 1);
        assert_eq!(conversations[0].mode, Mode::Research);
    }

    #[tokio::test]
    async fn test_malformed_body_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/conversations"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = backend_for(&server).list_conversations().await.unwrap_err();
        assert!(matches!(err, BackendError::Decode(_)));
    }

    #[tokio::test]
    async fn test_ids_are_encoded_as_one_path_segment() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/api/conversations/a%2Fb%3Fc"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        backend_for(&server)
            .delete_conversation("a/b?c")
            .await
            .unwrap();
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        let result = HttpChatBackend::new(&BackendConfig {
            base_url: "not a url".to_string(),
            ..BackendConfig::default()
        });
        assert!(matches!(result, Err(BackendError::Transport(_))));
    }

    #[tokio::test]
    async fn test_delete_and_update() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/api/conversations/c9"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/api/conversations/c9"))
            .and(body_json(json!({"title": "Renamed"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "c9",
                "title": "Renamed",
                "messages": [],
                "createdAt": "2024-05-01T10:00:00Z",
                "updatedAt": "2024-05-01T12:00:00Z"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let backend = backend_for(&server);
        backend.delete_conversation("c9").await.unwrap();
        let updated = backend
            .update_conversation(
                "c9",
                ConversationPatch {
                    title: Some("Renamed".to_string()),
                    mode: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.title, "Renamed");
    }
}
