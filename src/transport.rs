//! HTTP transport and the chunked line stream.
//!
//! Everything above this module speaks two narrow contracts: "send a
//! request, get a [`LineStream`] of raw text lines with cancellation" and
//! "send a request, get a single deserialized response". A request that
//! fails before the first line (connection error, non-success HTTP status)
//! fails synchronously from the `open_*` call; a failure mid-stream shows
//! up as an error item inside the stream. Callers can therefore always tell
//! "never started" apart from "started then failed".

use crate::config::ClientConfig;
use crate::error::KsqlError;
use crate::protocol::{
    CloseStreamRequest, ErrorBody, InsertStreamRequest, KsqlRequest, KsqlResponseEntity,
    QueryStreamRequest,
};
use crate::value::{KsqlObject, KsqlValue};
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use std::pin::Pin;
use std::time::Duration;
use tracing::debug;

const DELIMITED_MEDIA_TYPE: &str = "application/vnd.ksqlapi.delimited.v1";
const KSQL_MEDIA_TYPE: &str = "application/vnd.ksql.v1+json";

mod endpoints {
    pub const QUERY_STREAM: &str = "/query-stream";
    pub const INSERTS_STREAM: &str = "/inserts-stream";
    pub const CLOSE_STREAM: &str = "/close-stream";
    pub const KSQL: &str = "/ksql";
}

/// A stream of raw text lines from a chunked response body.
///
/// This type is also the seam for exercising the decoding pipelines without
/// a server: [`LineStream::from_lines`] and [`LineStream::new`] build
/// streams from in-memory data.
pub struct LineStream {
    inner: Pin<Box<dyn Stream<Item = Result<String, KsqlError>> + Send>>,
}

impl LineStream {
    /// Wraps an arbitrary line stream.
    pub fn new(stream: impl Stream<Item = Result<String, KsqlError>> + Send + 'static) -> Self {
        LineStream {
            inner: Box::pin(stream),
        }
    }

    /// A finite stream of successful lines, for tests and fixtures.
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        I::IntoIter: Send + 'static,
        S: Into<String>,
    {
        LineStream::new(futures_util::stream::iter(
            lines.into_iter().map(|line| Ok(line.into())),
        ))
    }

    fn from_response(response: reqwest::Response) -> Self {
        LineStream::new(split_lines(response.bytes_stream()))
    }

    /// The next raw line, or `None` at end of stream. An `Err` item is
    /// terminal: the stream yields nothing after it.
    pub async fn next_line(&mut self) -> Option<Result<String, KsqlError>> {
        self.inner.next().await
    }
}

impl std::fmt::Debug for LineStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineStream").finish_non_exhaustive()
    }
}

/// Splits a chunked byte stream into text lines. `\r\n` and `\n` both
/// terminate a line; a trailing unterminated line is yielded at end of
/// input. A transport error ends the stream after the error item.
fn split_lines(
    bytes: impl Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
) -> impl Stream<Item = Result<String, KsqlError>> + Send {
    struct State<S> {
        bytes: S,
        buffer: Vec<u8>,
        eof: bool,
    }

    let state = State {
        bytes: Box::pin(bytes),
        buffer: Vec::new(),
        eof: false,
    };

    futures_util::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(pos) = state.buffer.iter().position(|&b| b == b'\n') {
                let mut line: Vec<u8> = state.buffer.drain(..=pos).collect();
                line.pop();
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                return match String::from_utf8(line) {
                    Ok(text) => Some((Ok(text), state)),
                    Err(_) => {
                        state.eof = true;
                        state.buffer.clear();
                        Some((
                            Err(KsqlError::protocol("Response line is not valid UTF-8")),
                            state,
                        ))
                    }
                };
            }
            if state.eof {
                if state.buffer.is_empty() {
                    return None;
                }
                let tail = std::mem::take(&mut state.buffer);
                return match String::from_utf8(tail) {
                    Ok(text) => Some((Ok(text), state)),
                    Err(_) => Some((
                        Err(KsqlError::protocol("Response line is not valid UTF-8")),
                        state,
                    )),
                };
            }
            match state.bytes.next().await {
                Some(Ok(chunk)) => state.buffer.extend_from_slice(&chunk),
                Some(Err(e)) => {
                    state.eof = true;
                    state.buffer.clear();
                    return Some((Err(e.into()), state));
                }
                None => state.eof = true,
            }
        }
    })
}

/// reqwest-backed transport bound to one server.
#[derive(Debug)]
pub(crate) struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    request_timeout: Option<Duration>,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Result<Self, KsqlError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(KsqlError::from)?;
        Ok(HttpTransport {
            client,
            base_url: config.server_url.trim_end_matches('/').to_string(),
            request_timeout: (config.request_timeout_ms > 0)
                .then(|| Duration::from_millis(config.request_timeout_ms)),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// POST `/query-stream` and return the raw response line stream.
    /// Fails synchronously if the connection or the HTTP exchange fails
    /// before the body starts.
    pub async fn open_query_stream(
        &self,
        request: &QueryStreamRequest,
    ) -> Result<LineStream, KsqlError> {
        let url = self.url(endpoints::QUERY_STREAM);
        debug!(url = %url, "query_stream_request");
        let response = self
            .client
            .post(&url)
            .header(reqwest::header::ACCEPT, DELIMITED_MEDIA_TYPE)
            .json(request)
            .send()
            .await?;
        Self::ensure_success(response).await.map(LineStream::from_response)
    }

    /// POST `/inserts-stream` with a streaming body: the target line
    /// followed by one serialized row object per line. Returns the inbound
    /// acknowledgment line stream.
    pub async fn open_insert_stream(
        &self,
        target: &str,
        rows: impl Stream<Item = KsqlObject> + Send + 'static,
    ) -> Result<LineStream, KsqlError> {
        let url = self.url(endpoints::INSERTS_STREAM);
        debug!(url = %url, target = %target, "insert_stream_request");

        let mut first = serde_json::to_vec(&InsertStreamRequest {
            target: target.to_string(),
        })
        .map_err(|e| KsqlError::validation(format!("Unserializable insert target: {e}")))?;
        first.push(b'\n');

        let body_lines = futures_util::stream::once(async move {
            Ok::<Bytes, std::io::Error>(Bytes::from(first))
        })
        .chain(rows.map(|row| {
            let mut line = serde_json::to_vec(&KsqlValue::Object(row).to_json())
                .map_err(std::io::Error::other)?;
            line.push(b'\n');
            Ok(Bytes::from(line))
        }));

        let response = self
            .client
            .post(&url)
            .header(reqwest::header::ACCEPT, DELIMITED_MEDIA_TYPE)
            .header(reqwest::header::CONTENT_TYPE, DELIMITED_MEDIA_TYPE)
            .body(reqwest::Body::wrap_stream(body_lines))
            .send()
            .await?;
        Self::ensure_success(response).await.map(LineStream::from_response)
    }

    /// POST `/ksql` for one-shot statements and listings.
    pub async fn post_ksql(
        &self,
        request: &KsqlRequest,
    ) -> Result<Vec<KsqlResponseEntity>, KsqlError> {
        let url = self.url(endpoints::KSQL);
        debug!(url = %url, "ksql_request");
        let mut builder = self
            .client
            .post(&url)
            .header(reqwest::header::ACCEPT, KSQL_MEDIA_TYPE)
            .json(request);
        if let Some(timeout) = self.request_timeout {
            builder = builder.timeout(timeout);
        }
        let response = Self::ensure_success(builder.send().await?).await?;
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| {
            KsqlError::protocol(format!("Malformed /ksql response: {e}"))
        })
    }

    /// POST `/close-stream` to terminate a server-side push query stream.
    pub async fn post_close_stream(&self, query_id: &str) -> Result<(), KsqlError> {
        let url = self.url(endpoints::CLOSE_STREAM);
        debug!(url = %url, query_id = %query_id, "close_stream_request");
        let mut builder = self.client.post(&url).json(&CloseStreamRequest {
            query_id: query_id.to_string(),
        });
        if let Some(timeout) = self.request_timeout {
            builder = builder.timeout(timeout);
        }
        Self::ensure_success(builder.send().await?).await.map(|_| ())
    }

    /// Turns a non-success HTTP status into a `TransportError`, attaching
    /// the server's error body when it parses as one.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, KsqlError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let text = response.text().await.unwrap_or_default();
        let body: Option<ErrorBody> = serde_json::from_str(&text).ok();
        let message = match body {
            Some(ErrorBody {
                error_code,
                message: Some(message),
            }) => match error_code {
                Some(code) => format!("{message} (error_code {code})"),
                None => message,
            },
            _ if !text.is_empty() => text,
            _ => "Server returned an error status".to_string(),
        };
        Err(KsqlError::Transport {
            message,
            status: Some(status.as_u16()),
        })
    }
}
