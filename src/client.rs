use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("could not build HTTP client: {0}")]
    Build(reqwest::Error),
    #[error("request to /api/{endpoint} failed: {source}")]
    Transport {
        endpoint: &'static str,
        source: reqwest::Error,
    },
    #[error("/api/{endpoint} returned status {status}")]
    Status {
        endpoint: &'static str,
        status: StatusCode,
    },
    #[error("could not decode /api/{endpoint} response: {source}")]
    Decode {
        endpoint: &'static str,
        source: reqwest::Error,
    },
}

/// A model reply as returned by the start, question and feedback endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Reply {
    pub output: String,
    #[serde(default)]
    pub thoughts: Option<String>,
}

#[derive(Serialize)]
struct QuestionRequest<'a> {
    prompt: &'a str,
}

#[derive(Serialize)]
struct FeedbackRequest<'a> {
    feedback_messages: &'a [String],
}

#[derive(Serialize)]
struct ModerationRequest<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct ModerationResponse {
    data: ModerationVerdict,
}

#[derive(Deserialize)]
struct ModerationVerdict {
    #[serde(rename = "isSafe")]
    is_safe: bool,
}

/// The four calls the controller makes against the story backend.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn start(&self) -> Result<Reply, ClientError>;
    async fn question(&self, prompt: &str) -> Result<Reply, ClientError>;
    async fn feedback(&self, messages: &[String]) -> Result<Reply, ClientError>;
    /// Returns whether `text` is safe to display.
    async fn moderate(&self, text: &str) -> Result<bool, ClientError>;
}

#[derive(Clone)]
pub struct StoryClient {
    client: Client,
    base_url: String,
}

impl StoryClient {
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self, ClientError> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(ClientError::Build)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/api/{}", self.base_url, endpoint)
    }

    async fn get_json<T>(&self, endpoint: &'static str) -> Result<T, ClientError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let request = self.client.get(self.url(endpoint));
        Self::send(endpoint, request).await
    }

    async fn post_json<B, T>(&self, endpoint: &'static str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: for<'de> Deserialize<'de>,
    {
        let request = self.client.post(self.url(endpoint)).json(body);
        Self::send(endpoint, request).await
    }

    async fn send<T>(endpoint: &'static str, request: reqwest::RequestBuilder) -> Result<T, ClientError>
    where
        T: for<'de> Deserialize<'de>,
    {
        tracing::debug!(endpoint, "sending request");

        let response = request
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .send()
            .await
            .map_err(|source| ClientError::Transport { endpoint, source })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status { endpoint, status });
        }

        response
            .json::<T>()
            .await
            .map_err(|source| ClientError::Decode { endpoint, source })
    }
}

#[async_trait]
impl Backend for StoryClient {
    async fn start(&self) -> Result<Reply, ClientError> {
        self.get_json("start").await
    }

    async fn question(&self, prompt: &str) -> Result<Reply, ClientError> {
        self.post_json("question", &QuestionRequest { prompt }).await
    }

    async fn feedback(&self, messages: &[String]) -> Result<Reply, ClientError> {
        self.post_json("feedback", &FeedbackRequest { feedback_messages: messages })
            .await
    }

    async fn moderate(&self, text: &str) -> Result<bool, ClientError> {
        let response: ModerationResponse = self.post_json("geoip", &ModerationRequest { text }).await?;
        Ok(response.data.is_safe)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::task::JoinHandle;

    /// Client for the local stub server, bypassing any proxy from the environment.
    fn local_client(base_url: &str) -> StoryClient {
        StoryClient {
            client: Client::builder().no_proxy().build().unwrap(),
            base_url: base_url.to_string(),
        }
    }

    /// Read one HTTP request: headers plus a `Content-Length` body.
    async fn read_request(stream: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);

            let text = String::from_utf8_lossy(&buf);
            if let Some(end) = text.find("\r\n\r\n") {
                let length = text[..end]
                    .lines()
                    .filter_map(|line| line.split_once(':'))
                    .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// Answer a single request with `status` and a JSON `body`. The handle
    /// yields the raw request that was received.
    async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let request = read_request(&mut stream).await;
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.unwrap();
            request
        });

        (format!("http://{}", addr), handle)
    }

    fn request_body(request: &str) -> serde_json::Value {
        let (_, body) = request.split_once("\r\n\r\n").unwrap();
        serde_json::from_str(body).unwrap()
    }

    #[tokio::test]
    async fn test_start_is_a_get() {
        let (base_url, server) =
            serve_once("200 OK", r#"{"output": "<p>Welcome</p>", "thoughts": null}"#).await;

        let reply = local_client(&base_url).start().await.unwrap();
        assert_eq!(
            reply,
            Reply {
                output: "<p>Welcome</p>".to_string(),
                thoughts: None,
            }
        );

        let request = server.await.unwrap();
        assert!(request.starts_with("GET /api/start HTTP/1.1"), "{}", request);
    }

    #[tokio::test]
    async fn test_question_posts_prompt() {
        let (base_url, server) =
            serve_once("200 OK", r#"{"output": "Once upon a time...", "thoughts": "Planning"}"#).await;

        let reply = local_client(&base_url).question("Tell me a story").await.unwrap();
        assert_eq!(reply.thoughts.as_deref(), Some("Planning"));

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /api/question HTTP/1.1"), "{}", request);
        assert!(request.to_ascii_lowercase().contains("content-type: application/json"));
        assert_eq!(request_body(&request), serde_json::json!({ "prompt": "Tell me a story" }));
    }

    #[tokio::test]
    async fn test_feedback_posts_messages() {
        let (base_url, server) = serve_once("200 OK", r#"{"output": "Again", "thoughts": null}"#).await;

        let messages = vec!["The story is too short, try again and make it longer.".to_string()];
        local_client(&base_url).feedback(&messages).await.unwrap();

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /api/feedback HTTP/1.1"), "{}", request);
        assert_eq!(
            request_body(&request),
            serde_json::json!({ "feedback_messages": messages })
        );
    }

    #[tokio::test]
    async fn test_moderate_posts_text() {
        let (base_url, server) = serve_once("200 OK", r#"{"data": {"isSafe": false}}"#).await;

        assert!(!local_client(&base_url).moderate("something rude").await.unwrap());

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /api/geoip HTTP/1.1"), "{}", request);
        assert_eq!(request_body(&request), serde_json::json!({ "text": "something rude" }));
    }

    #[tokio::test]
    async fn test_non_success_status_is_an_error() {
        let (base_url, _server) = serve_once("503 Service Unavailable", "{}").await;

        match local_client(&base_url).start().await {
            Err(ClientError::Status { endpoint, status }) => {
                assert_eq!(endpoint, "start");
                assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_moderation_server_error_fails_open() {
        let (base_url, _server) = serve_once(
            "500 Internal Server Error",
            r#"{"error": "Could not determine location"}"#,
        )
        .await;
        let client = local_client(&base_url);

        assert!(matches!(
            client.moderate("hello").await,
            Err(ClientError::Status { status, .. }) if status == StatusCode::INTERNAL_SERVER_ERROR
        ));

        let (base_url, _server) = serve_once(
            "500 Internal Server Error",
            r#"{"error": "Could not determine location"}"#,
        )
        .await;
        let controller = crate::controller::Controller::new(std::sync::Arc::new(local_client(&base_url)));
        assert!(controller.moderation_check("hello").await);
    }

    #[tokio::test]
    async fn test_unexpected_body_is_a_decode_error() {
        let (base_url, _server) = serve_once("200 OK", r#"{"message": "hi"}"#).await;

        assert!(matches!(
            local_client(&base_url).question("hi").await,
            Err(ClientError::Decode { endpoint: "question", .. })
        ));
    }

    #[tokio::test]
    async fn test_refused_connection_is_a_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        assert!(matches!(
            local_client(&format!("http://{}", addr)).start().await,
            Err(ClientError::Transport { endpoint: "start", .. })
        ));
    }

    #[test]
    fn test_reply_with_null_thoughts() {
        let reply: Reply = serde_json::from_str(r#"{"output": "<p>Hi</p>", "thoughts": null}"#).unwrap();
        assert_eq!(reply.output, "<p>Hi</p>");
        assert_eq!(reply.thoughts, None);
    }

    #[test]
    fn test_reply_without_thoughts_field() {
        let reply: Reply = serde_json::from_str(r#"{"output": "Hi"}"#).unwrap();
        assert_eq!(reply.thoughts, None);
    }

    #[test]
    fn test_request_bodies() {
        let question = serde_json::to_value(QuestionRequest { prompt: "Tell me a story" }).unwrap();
        assert_eq!(question, serde_json::json!({ "prompt": "Tell me a story" }));

        let messages = vec!["The story is too short, try again and make it longer.".to_string()];
        let feedback = serde_json::to_value(FeedbackRequest { feedback_messages: &messages }).unwrap();
        assert_eq!(
            feedback,
            serde_json::json!({ "feedback_messages": ["The story is too short, try again and make it longer."] })
        );

        let moderation = serde_json::to_value(ModerationRequest { text: "hello" }).unwrap();
        assert_eq!(moderation, serde_json::json!({ "text": "hello" }));
    }

    #[test]
    fn test_empty_feedback_serializes_as_array() {
        let feedback = serde_json::to_value(FeedbackRequest { feedback_messages: &[] }).unwrap();
        assert_eq!(feedback, serde_json::json!({ "feedback_messages": [] }));
    }

    #[test]
    fn test_moderation_response() {
        let response: ModerationResponse =
            serde_json::from_str(r#"{"data": {"isSafe": false, "score": 0.9}}"#).unwrap();
        assert!(!response.data.is_safe);
    }

    #[test]
    fn test_base_url_trailing_slash_stripped() {
        let client = StoryClient::new("http://127.0.0.1:5000/", None).unwrap();
        assert_eq!(client.base_url(), "http://127.0.0.1:5000");
        assert_eq!(client.url("start"), "http://127.0.0.1:5000/api/start");
    }
}
