//! Streaming HTTP client for the text-generation endpoint.

use std::collections::VecDeque;
use std::fmt::Display;

use async_trait::async_trait;
use futures_util::{Stream, StreamExt, stream::BoxStream};
use proto::StreamError;
use reqwest::header::ACCEPT;
use tracing::{debug, trace};

use crate::frame::FrameDecoder;

const DEFAULT_API_KEY_HEADER: &str = "x-api-key";
const DEFAULT_ACCEPT: &str = "text/event-stream";
const DEFAULT_PROMPT_PARAM: &str = "prompt";
const ERROR_BODY_PREVIEW_CHARS: usize = 500;

/// Source of streamed answers.
#[async_trait]
pub trait StreamProvider: Send + Sync {
    /// Issues the request for `prompt` and returns its fragment source once a
    /// consumable body has been obtained.
    async fn open(&self, prompt: &str) -> Result<FragmentStream, StreamError>;
}

// ── Fragment stream ────────────────────────────────────────────────────────────

/// Ordered fragments of one streamed answer plus their running concatenation.
pub struct FragmentStream {
    body: BoxStream<'static, Result<Vec<u8>, String>>,
    decoder: FrameDecoder,
    pending: VecDeque<String>,
    accumulated: String,
    chunks_read: usize,
    fragments: usize,
    finished: bool,
}

impl FragmentStream {
    /// Wraps any byte-chunk stream. Errors are reported through their `Display` text.
    pub fn new<S, B, E>(body: S) -> Self
    where
        S: Stream<Item = Result<B, E>> + Send + 'static,
        B: AsRef<[u8]>,
        E: Display,
    {
        let body = body
            .map(|chunk| match chunk {
                Ok(bytes) => Ok(bytes.as_ref().to_vec()),
                Err(e) => Err(e.to_string()),
            })
            .boxed();
        Self {
            body,
            decoder: FrameDecoder::new(),
            pending: VecDeque::new(),
            accumulated: String::new(),
            chunks_read: 0,
            fragments: 0,
            finished: false,
        }
    }

    /// Streams the body of an HTTP response.
    pub fn from_response(response: reqwest::Response) -> Self {
        Self::new(response.bytes_stream())
    }

    /// Waits for the next fragment.
    ///
    /// Returns `None` once the transport reports end of stream. A read error
    /// ends the stream: it is a [`StreamError::Transport`] when no chunk was
    /// read yet and a [`StreamError::MidStream`] afterwards.
    pub async fn next_fragment(&mut self) -> Option<Result<String, StreamError>> {
        loop {
            if let Some(fragment) = self.pending.pop_front() {
                self.accumulated.push_str(&fragment);
                self.fragments += 1;
                trace!(
                    fragment_len = fragment.len(),
                    total_len = self.accumulated.len(),
                    "Fragment accumulated"
                );
                return Some(Ok(fragment));
            }
            if self.finished {
                return None;
            }

            match self.body.next().await {
                Some(Ok(chunk)) => {
                    self.chunks_read += 1;
                    trace!(chunk = self.chunks_read, bytes = chunk.len(), "Chunk read");
                    self.pending.extend(self.decoder.push(&chunk));
                }
                Some(Err(e)) => {
                    self.finished = true;
                    debug!(error = %e, chunks = self.chunks_read, "Stream read failed");
                    let err = if self.chunks_read == 0 {
                        StreamError::Transport(e)
                    } else {
                        StreamError::MidStream(e)
                    };
                    return Some(Err(err));
                }
                None => {
                    self.finished = true;
                    self.pending.extend(self.decoder.finish());
                    debug!(
                        chunks = self.chunks_read,
                        fragments = self.fragments + self.pending.len(),
                        "Stream ended"
                    );
                }
            }
        }
    }

    /// Drains the stream and returns the full text.
    pub async fn collect_text(mut self) -> Result<String, StreamError> {
        while let Some(next) = self.next_fragment().await {
            next?;
        }
        Ok(self.accumulated)
    }

    /// Concatenation of every fragment yielded so far.
    pub fn accumulated(&self) -> &str {
        &self.accumulated
    }

    pub fn chunks_read(&self) -> usize {
        self.chunks_read
    }

    pub fn fragments(&self) -> usize {
        self.fragments
    }
}

impl std::fmt::Debug for FragmentStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FragmentStream")
            .field("chunks_read", &self.chunks_read)
            .field("fragments", &self.fragments)
            .field("accumulated_len", &self.accumulated.len())
            .field("finished", &self.finished)
            .finish()
    }
}

// ── HTTP client ────────────────────────────────────────────────────────────────

/// Streams answers from a GET endpoint that takes the prompt as a query parameter.
pub struct StreamClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    api_key_header: String,
    accept: String,
    prompt_param: String,
    extra_headers: Vec<(String, String)>,
}

impl StreamClient {
    /// Creates a client with the default header and parameter names.
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            api_key_header: DEFAULT_API_KEY_HEADER.to_string(),
            accept: DEFAULT_ACCEPT.to_string(),
            prompt_param: DEFAULT_PROMPT_PARAM.to_string(),
            extra_headers: Vec::new(),
        }
    }

    /// Overrides the header that carries the API key.
    pub fn with_api_key_header(mut self, name: impl Into<String>) -> Self {
        self.api_key_header = name.into();
        self
    }

    /// Overrides the `Accept` header value.
    pub fn with_accept(mut self, accept: impl Into<String>) -> Self {
        self.accept = accept.into();
        self
    }

    /// Overrides the query parameter that carries the prompt.
    pub fn with_prompt_param(mut self, name: impl Into<String>) -> Self {
        self.prompt_param = name.into();
        self
    }

    /// Adds a static request header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.push((name.into(), value.into()));
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl StreamProvider for StreamClient {
    async fn open(&self, prompt: &str) -> Result<FragmentStream, StreamError> {
        debug!(
            endpoint = %self.endpoint,
            prompt_len = prompt.len(),
            "Opening answer stream"
        );

        let mut req_builder = self
            .client
            .get(&self.endpoint)
            .query(&[(self.prompt_param.as_str(), prompt)])
            .header(ACCEPT, self.accept.as_str());
        if !self.api_key.is_empty() {
            req_builder = req_builder.header(self.api_key_header.as_str(), self.api_key.as_str());
        }
        for (name, value) in &self.extra_headers {
            req_builder = req_builder.header(name.as_str(), value.as_str());
        }

        let response = req_builder
            .send()
            .await
            .map_err(|e| StreamError::Transport(e.to_string()))?;

        let status = response.status();
        debug!(status = %status.as_u16(), "Stream response received");
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StreamError::Status {
                status: status.as_u16(),
                body: body.chars().take(ERROR_BODY_PREVIEW_CHARS).collect(),
            });
        }

        Ok(FragmentStream::from_response(response))
    }
}
