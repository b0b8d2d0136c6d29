use super::auth::{LoginRequest, SignupForm};
use super::stream::sse_text_stream;
use super::{
    AuthResponse, ChatRecord, MessageRecord, SearchEnvelope, SearchResults, StartChatRecord,
    StartChatRequest, StartedChat, StreamRequest, UploadedDocument,
};
use crate::config::ClientConfig;
use crate::messages::{ChatMode, ChatSummary, Message};
use crate::session::{SessionContext, User};
use crate::upload::SelectedFile;
use crate::{Result, VoxError};
use futures::stream::BoxStream;
use futures::StreamExt;
use parking_lot::RwLock;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Stream of text chunks for one streamed reply
pub type ChunkStream = BoxStream<'static, Result<String>>;

/// HTTP client for the VoxAI REST API
pub struct ApiClient {
    http: Client,
    base_url: String,
    timeout: Duration,
    token: RwLock<Option<String>>,
}

impl ApiClient {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| VoxError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.api.base_url.trim_end_matches('/').to_string(),
            timeout: config.request_timeout(),
            token: RwLock::new(None),
        })
    }

    /// Reuse the token of a persisted session
    pub fn with_session(self, session: &SessionContext) -> Self {
        *self.token.write() = session.token.clone();
        self
    }

    pub fn set_token(&self, token: Option<String>) {
        *self.token.write() = token;
    }

    pub fn has_token(&self) -> bool {
        self.token.read().is_some()
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match self.token.read().as_ref() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = self.authorized(request).send().await?;
        check_status(response).await
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = self.send(request.timeout(self.timeout)).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| VoxError::DecodeError(e.to_string()))
    }

    pub async fn login(&self, request: &LoginRequest) -> Result<AuthResponse> {
        request.validate()?;
        let auth: AuthResponse = self
            .send_json(self.http.post(self.url("auth/login")).json(request))
            .await?;
        self.set_token(Some(auth.access_token.clone()));
        info!("Signed in as {}", auth.user.email);
        Ok(auth)
    }

    pub async fn signup(&self, form: &SignupForm) -> Result<AuthResponse> {
        form.validate()?;
        let auth: AuthResponse = self
            .send_json(self.http.post(self.url("auth/signup")).json(&form.to_request()))
            .await?;
        self.set_token(Some(auth.access_token.clone()));
        info!("Created account {}", auth.user.email);
        Ok(auth)
    }

    /// Returns the service's confirmation text
    pub async fn forgot_password(&self, email: &str) -> Result<String> {
        if !super::auth::is_valid_email(email) {
            return Err(VoxError::ValidationError(
                "Please enter a valid email address".into(),
            ));
        }
        let body: serde_json::Value = self
            .send_json(
                self.http
                    .post(self.url("auth/forgot-password"))
                    .query(&[("email", email)]),
            )
            .await?;
        Ok(body
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or_default()
            .to_string())
    }

    pub async fn me(&self) -> Result<User> {
        self.send_json(self.http.get(self.url("auth/me"))).await
    }

    pub async fn list_chats(&self) -> Result<Vec<ChatSummary>> {
        let records: Vec<ChatRecord> = self.send_json(self.http.get(self.url("chat/list"))).await?;
        debug!("Fetched {} chats", records.len());
        Ok(records.into_iter().map(Into::into).collect())
    }

    pub async fn chat_messages(&self, chat_id: &str) -> Result<Vec<Message>> {
        let records: Vec<MessageRecord> = self
            .send_json(self.http.get(self.url(&format!("chat/{}/messages", chat_id))))
            .await?;
        Ok(records.into_iter().map(Into::into).collect())
    }

    /// Create a chat from its first message; the reply comes back in the same call
    pub async fn start_chat(
        &self,
        user_id: &str,
        mode: ChatMode,
        first_message: &str,
    ) -> Result<StartedChat> {
        let body = StartChatRequest {
            user_id,
            mode,
            first_message,
        };
        let record: StartChatRecord = self
            .send_json(self.http.post(self.url("chat/start")).json(&body))
            .await?;
        info!("Started chat {} ({})", record.chat_id, mode.as_str());
        Ok(record.into())
    }

    pub async fn delete_chat(&self, chat_id: &str) -> Result<()> {
        self.send(
            self.http
                .delete(self.url(&format!("chat/{}", chat_id)))
                .timeout(self.timeout),
        )
        .await?;
        info!("Deleted chat {}", chat_id);
        Ok(())
    }

    /// Send a message to an existing chat and stream the reply.
    ///
    /// No overall timeout applies; the caller stops consuming to cancel.
    pub async fn stream_message(
        &self,
        chat_id: &str,
        content: &str,
        mode: ChatMode,
    ) -> Result<ChunkStream> {
        let body = StreamRequest { content, mode };
        let response = self
            .send(
                self.http
                    .post(self.url(&format!("chat/{}/stream", chat_id)))
                    .json(&body),
            )
            .await?;
        debug!("Streaming reply for chat {}", chat_id);
        Ok(sse_text_stream(response.bytes_stream()).boxed())
    }

    pub async fn upload_pdf(&self, user_id: &str, file: &SelectedFile) -> Result<UploadedDocument> {
        let part = reqwest::multipart::Part::bytes(file.bytes.clone())
            .file_name(file.name.clone())
            .mime_str(&file.mime_type)
            .map_err(|e| VoxError::ValidationError(format!("Invalid MIME type: {}", e)))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let document: UploadedDocument = self
            .send_json(
                self.http
                    .post(self.url("upload-pdf"))
                    .query(&[("user_id", user_id)])
                    .multipart(form),
            )
            .await?;
        info!("Uploaded {} as {}", document.file_name, document.document_id);
        Ok(document)
    }

    pub async fn search(&self, query: &str) -> Result<SearchResults> {
        if query.trim().is_empty() {
            return Err(VoxError::ValidationError("Search query is empty".into()));
        }
        let envelope: SearchEnvelope = self
            .send_json(
                self.http
                    .post(self.url("search"))
                    .json(&serde_json::json!({ "query": query })),
            )
            .await?;
        Ok(envelope.results)
    }
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let detail = error_detail(&body).unwrap_or_else(|| {
        status
            .canonical_reason()
            .unwrap_or("Request failed")
            .to_string()
    });
    warn!("API request failed with {}: {}", status, detail);
    Err(VoxError::ApiError {
        status: status.as_u16(),
        detail,
    })
}

/// Pull the human-readable part out of an error body
fn error_detail(body: &str) -> Option<String> {
    if body.trim().is_empty() {
        return None;
    }
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(json) => match json.get("detail") {
            Some(serde_json::Value::String(detail)) => Some(detail.clone()),
            Some(other) => Some(other.to_string()),
            None => Some(body.to_string()),
        },
        Err(_) => Some(body.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_detail_variants() {
        assert_eq!(
            error_detail(r#"{"detail":"Chat not found"}"#).as_deref(),
            Some("Chat not found")
        );
        assert_eq!(
            error_detail(r#"{"detail":[{"msg":"field required"}]}"#).as_deref(),
            Some(r#"[{"msg":"field required"}]"#)
        );
        assert_eq!(error_detail("Bad Gateway").as_deref(), Some("Bad Gateway"));
        assert_eq!(error_detail("  "), None);
    }

    #[test]
    fn test_urls_and_token() {
        let config = ClientConfig::default().with_api_url("http://localhost:9/api/v1/");
        let client = ApiClient::new(&config).unwrap();
        assert_eq!(client.url("chat/list"), "http://localhost:9/api/v1/chat/list");
        assert!(!client.has_token());

        let mut session = SessionContext::default();
        session.token = Some("t".into());
        let client = client.with_session(&session);
        assert!(client.has_token());
    }

    #[tokio::test]
    async fn test_validation_happens_before_network() {
        // Nothing listens on this port; a validation error proves no request was made
        let config = ClientConfig::default().with_api_url("http://127.0.0.1:9/api/v1");
        let client = ApiClient::new(&config).unwrap();

        let err = client.login(&LoginRequest::new("not-an-email", "pw")).await.unwrap_err();
        assert!(matches!(err, VoxError::ValidationError(_)));

        let err = client.forgot_password("x").await.unwrap_err();
        assert!(matches!(err, VoxError::ValidationError(_)));

        let err = client.search("   ").await.unwrap_err();
        assert!(matches!(err, VoxError::ValidationError(_)));
    }
}
