use async_trait::async_trait;
use reqwest::StatusCode;
use uuid::Uuid;

use alcove_types::api::MessagePage;
use alcove_types::models::ChatScope;

use crate::error::FetchError;

/// Fetches one page of history. The production implementation speaks
/// HTTP; tests substitute an in-memory store.
#[async_trait]
pub trait PageClient: Send + Sync {
    async fn fetch_page(
        &self,
        scope: &ChatScope,
        cursor: Option<Uuid>,
        page_number: u32,
    ) -> Result<MessagePage, FetchError>;
}

/// reqwest-backed page client for the two read endpoints.
pub struct HttpPageClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpPageClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http: reqwest::Client::new(),
            base_url,
            token: token.into(),
        }
    }

    fn endpoint(&self, scope: &ChatScope) -> String {
        let path = match scope {
            ChatScope::Channel { .. } => "/api/messages",
            ChatScope::Conversation { .. } => "/api/direct-messages",
        };
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl PageClient for HttpPageClient {
    async fn fetch_page(
        &self,
        scope: &ChatScope,
        cursor: Option<Uuid>,
        page_number: u32,
    ) -> Result<MessagePage, FetchError> {
        let mut query: Vec<(&str, String)> = vec![
            (scope.scope_key(), scope.chat_id().to_string()),
            ("page", page_number.to_string()),
        ];
        if let Some(cursor) = cursor {
            query.push(("cursor", cursor.to_string()));
        }

        let response = self
            .http
            .get(self.endpoint(scope))
            .bearer_auth(&self.token)
            .query(&query)
            .send()
            .await?;

        // Failure bodies are plain text, not JSON. Branch on the status
        // before touching the body.
        match response.status() {
            StatusCode::OK => Ok(response.json::<MessagePage>().await?),
            StatusCode::UNAUTHORIZED => Err(FetchError::Unauthorized),
            StatusCode::BAD_REQUEST => Err(FetchError::BadRequest(body_text(response).await)),
            status => {
                let body = body_text(response).await;
                Err(FetchError::Server(format!("{status}: {body}")))
            }
        }
    }
}

async fn body_text(response: reqwest::Response) -> String {
    response.text().await.unwrap_or_default()
}
