//! HTTP implementation of the thread transport

use super::wire::{
    parse_body, SendMessageBody, WireCreatedThread, WireErrorBody, WireSendReply, WireThread,
};
use super::{CreatedThread, SendReply, SendRequest, ThreadError, ThreadTransport, TransportConfig};
use crate::model::Thread;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode, Url};

const THREAD_NOT_FOUND_CODE: &str = "thread_not_found";

/// Which endpoint a response came from; 404 only means thread-not-found on
/// thread-scoped paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endpoint {
    CreateThread,
    ThreadScoped,
}

/// JSON-over-HTTP thread API client
pub struct HttpTransport {
    client: Client,
    base_url: Url,
    api_token: Option<String>,
}

impl HttpTransport {
    pub fn new(config: &TransportConfig) -> Result<Self, ThreadError> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            ThreadError::transport(format!("Invalid base URL `{}`: {e}", config.base_url))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ThreadError::transport(format!(
                "Invalid base URL `{}`: cannot hold a path",
                config.base_url
            )));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ThreadError::transport(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            api_token: config.api_token.clone(),
        })
    }

    /// Base URL extended by `segments`, each percent-encoded as one segment
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn threads_url(&self) -> Url {
        self.endpoint(&["threads"])
    }

    fn thread_url(&self, thread_id: &str) -> Url {
        self.endpoint(&["threads", thread_id])
    }

    fn messages_url(&self, thread_id: &str) -> Url {
        self.endpoint(&["threads", thread_id, "messages"])
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.api_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Send the request and return the body of a successful response
    async fn execute(
        &self,
        builder: RequestBuilder,
        endpoint: Endpoint,
    ) -> Result<String, ThreadError> {
        let response = self
            .authorize(builder)
            .header("accept", "application/json")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ThreadError::transport(format!("Request timeout: {e}"))
                } else if e.is_connect() {
                    ThreadError::transport(format!("Connection failed: {e}"))
                } else {
                    ThreadError::transport(format!("Request failed: {e}"))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ThreadError::transport(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(classify_error(status, &body, endpoint));
        }
        Ok(body)
    }
}

fn classify_error(status: StatusCode, body: &str, endpoint: Endpoint) -> ThreadError {
    let detail = WireErrorBody::message(body).unwrap_or_else(|| body.to_string());

    if WireErrorBody::code(body).as_deref() == Some(THREAD_NOT_FOUND_CODE)
        || (status == StatusCode::NOT_FOUND && endpoint == Endpoint::ThreadScoped)
    {
        return ThreadError::thread_not_found(format!("Thread not found: {detail}"));
    }

    match status.as_u16() {
        401 | 403 => ThreadError::transport(format!("Authentication failed: {detail}")),
        429 => ThreadError::transport(format!("Rate limited: {detail}")),
        400 => ThreadError::transport(format!("Invalid request: {detail}")),
        500..=599 => ThreadError::transport(format!("Server error: {detail}")),
        _ => ThreadError::transport(format!("HTTP {status}: {detail}")),
    }
}

#[async_trait]
impl ThreadTransport for HttpTransport {
    async fn create_thread(&self) -> Result<CreatedThread, ThreadError> {
        let body = self
            .execute(
                self.client.post(self.threads_url()).json(&serde_json::json!({})),
                Endpoint::CreateThread,
            )
            .await?;
        let id = parse_body::<WireCreatedThread>(&body)?.validate()?;
        Ok(CreatedThread { id })
    }

    async fn get_thread(&self, thread_id: &str) -> Result<Thread, ThreadError> {
        let body = self
            .execute(self.client.get(self.thread_url(thread_id)), Endpoint::ThreadScoped)
            .await?;
        parse_body::<WireThread>(&body)?.validate(thread_id)
    }

    async fn send_message(&self, request: &SendRequest) -> Result<SendReply, ThreadError> {
        let builder = self
            .client
            .post(self.messages_url(&request.thread_id))
            .json(&SendMessageBody {
                text: &request.text,
            });
        let body = self.execute(builder, Endpoint::ThreadScoped).await?;
        let assistant_message = parse_body::<WireSendReply>(&body)?.validate()?;
        Ok(SendReply { assistant_message })
    }
}
