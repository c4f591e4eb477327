use super::{check_status, ApiError, BackendClient};
use async_stream::try_stream;
use futures::{Stream, StreamExt};
use reqwest::header::CONTENT_TYPE;
use reqwest::multipart::Form;
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use std::pin::Pin;

/// Lazily issued answer: one item per decoded body chunk, in arrival order.
pub type AnswerStream = Pin<Box<dyn Stream<Item = Result<String, ApiError>> + Send>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AskRequest {
    pub question: String,
    pub api_key: String,
    /// Empty means the question is not scoped to one document.
    pub pdf_name: String,
}

impl AskRequest {
    fn form(&self) -> Form {
        Form::new()
            .text("question", self.question.clone())
            .text("api_key", self.api_key.clone())
            .text("pdf_name", self.pdf_name.clone())
    }
}

#[derive(Deserialize)]
struct AskResponse {
    #[serde(default)]
    answer: String,
    #[serde(default)]
    error: Option<String>,
}

impl AskResponse {
    fn into_answer(self) -> Result<String, ApiError> {
        match self.error {
            Some(error) => Err(ApiError::Service(error)),
            None => Ok(self.answer),
        }
    }
}

fn is_json(resp: &Response) -> bool {
    resp.headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"))
}

/// Reads a reply that arrived whole instead of as fragments.
///
/// A `{answer}` envelope yields its answer; any other body is the answer text.
async fn read_whole_answer(resp: Response) -> Result<String, ApiError> {
    let body = resp.text().await?;
    match serde_json::from_str::<AskResponse>(&body) {
        Ok(reply) => reply.into_answer(),
        Err(_) => Ok(body),
    }
}

/// Incremental UTF-8 decoder for unframed byte chunks.
///
/// A multi-byte character split across two chunks is held back until it is
/// complete. Invalid sequences decode to U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        let mut bytes = std::mem::take(&mut self.pending);
        bytes.extend_from_slice(chunk);

        let mut out = String::new();
        let mut rest: &[u8] = &bytes;
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        None => {
                            self.pending = after.to_vec();
                            break;
                        }
                    }
                }
            }
        }
        out
    }

    /// Flushes a dangling partial sequence left when the body ended.
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            return String::new();
        }
        let tail = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        tail
    }
}

fn answer_fragments(
    client: BackendClient,
    request: AskRequest,
) -> impl Stream<Item = Result<String, ApiError>> + Send {
    try_stream! {
        let url = client.endpoint("ask-stream")?;
        tracing::debug!(pdf = %request.pdf_name, "asking question");
        let resp = client
            .http
            .post(url)
            .multipart(request.form())
            .send()
            .await?;

        if matches!(resp.status(), StatusCode::NOT_FOUND | StatusCode::METHOD_NOT_ALLOWED) {
            tracing::warn!(status = %resp.status(), "streaming endpoint unavailable, using /ask");
            let answer = client.ask(&request).await?;
            if !answer.is_empty() {
                yield answer;
            }
        } else {
            let resp = check_status(resp).await?;
            if is_json(&resp) {
                tracing::debug!("answer arrived as one JSON body");
                let answer = read_whole_answer(resp).await?;
                if !answer.is_empty() {
                    yield answer;
                }
            } else {
                let mut body = resp.bytes_stream();
                let mut decoder = Utf8Decoder::default();
                while let Some(chunk) = body.next().await {
                    let text = decoder.decode(&chunk?);
                    if !text.is_empty() {
                        yield text;
                    }
                }
                let tail = decoder.finish();
                if !tail.is_empty() {
                    yield tail;
                }
            }
        }
    }
}

impl BackendClient {
    /// Streams the answer to `request` from `/ask-stream`.
    ///
    /// Nothing is sent until the stream is first polled. If the service has
    /// no streaming endpoint the buffered `/ask` answer is yielded whole, and
    /// a JSON reply from `/ask-stream` itself is read whole the same way.
    pub fn ask_stream(&self, request: AskRequest) -> AnswerStream {
        Box::pin(answer_fragments(self.clone(), request))
    }

    /// Buffered answer from `/ask`.
    pub async fn ask(&self, request: &AskRequest) -> Result<String, ApiError> {
        let resp = self
            .http
            .post(self.endpoint("ask")?)
            .multipart(request.form())
            .send()
            .await?;
        let data: AskResponse = check_status(resp)
            .await?
            .json()
            .await
            .map_err(|e| ApiError::Parse(e.to_string()))?;
        data.into_answer()
    }
}
