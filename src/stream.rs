//! Streaming result pipelines.
//!
//! A streamed response is consumed by a spawned reader task that decodes
//! lines and hands items to the consumer over a bounded channel, so a slow
//! consumer backpressures the reader rather than buffering without limit.
//! An `Err` item is always terminal: the reader stops after producing one
//! and the stream yields nothing further.
//!
//! Cancellation is cooperative. [`RowStream::cancel`] (or a detached
//! [`CancelHandle`]) flips a watch flag; the consumer side checks the flag
//! on every poll, so rows already sitting in the channel are discarded, and
//! the reader task observes the flag, drops the transport and wakes a
//! consumer blocked on an empty channel with [`KsqlError::Cancelled`].

use crate::error::KsqlError;
use crate::protocol::{InsertAckLine, QueryStreamHeader};
use crate::row::{decode_row, Row};
use crate::schema::ColumnSchema;
use crate::transport::LineStream;
use futures_util::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, watch};
use tracing::debug;

/// Cancels the stream it was taken from. Cloneable and sendable, so one
/// task can consume rows while another decides when to stop.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    cancel: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        let _ = self.cancel.send(true);
    }
}

/// Consumer half of a reader pipeline.
struct Pipeline<T> {
    receiver: mpsc::Receiver<Result<T, KsqlError>>,
    cancel_flag: watch::Receiver<bool>,
    done: bool,
}

impl<T> Stream for Pipeline<T> {
    type Item = Result<T, KsqlError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }
        // Checked before the channel so buffered items never outlive a
        // cancellation request.
        if *this.cancel_flag.borrow() {
            this.done = true;
            this.receiver.close();
            return Poll::Ready(Some(Err(KsqlError::Cancelled)));
        }
        match this.receiver.poll_recv(cx) {
            Poll::Ready(Some(item)) => {
                if item.is_err() {
                    this.done = true;
                }
                Poll::Ready(Some(item))
            }
            Poll::Ready(None) => {
                this.done = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Spawns the reader task for one line stream. `decode` turns each
/// non-blank line into an item; its first error is sent and ends the task.
fn spawn_decoder<T, F>(
    mut lines: LineStream,
    capacity: usize,
    mut decode: F,
) -> (Pipeline<T>, Arc<watch::Sender<bool>>)
where
    T: Send + 'static,
    F: FnMut(&str) -> Result<T, KsqlError> + Send + 'static,
{
    let (tx, receiver) = mpsc::channel(capacity);
    let (cancel_tx, cancel_flag) = watch::channel(false);
    let cancel_tx = Arc::new(cancel_tx);
    let mut cancel_rx = cancel_flag.clone();

    tokio::spawn(async move {
        loop {
            let line = tokio::select! {
                changed = cancel_rx.changed() => {
                    if changed.is_ok() {
                        debug!("stream_cancelled");
                        let _ = tx.send(Err(KsqlError::Cancelled)).await;
                    }
                    return;
                }
                line = lines.next_line() => line,
            };
            match line {
                None => return,
                Some(Err(e)) => {
                    let _ = tx.send(Err(e)).await;
                    return;
                }
                Some(Ok(text)) => {
                    if text.trim().is_empty() {
                        continue;
                    }
                    let item = decode(&text);
                    let terminal = item.is_err();
                    if tx.send(item).await.is_err() || terminal {
                        return;
                    }
                }
            }
        }
    });

    (
        Pipeline {
            receiver,
            cancel_flag,
            done: false,
        },
        cancel_tx,
    )
}

/// Rows of one streamed query, in arrival order.
pub struct RowStream {
    inner: Pipeline<Row>,
    cancel: Arc<watch::Sender<bool>>,
}

impl RowStream {
    /// Requests cancellation of this stream. The next poll yields
    /// [`KsqlError::Cancelled`] and the stream ends; rows that were already
    /// buffered are discarded.
    pub fn cancel(&self) {
        let _ = self.cancel.send(true);
    }

    /// A detached handle that can cancel this stream from another task.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            cancel: Arc::clone(&self.cancel),
        }
    }

    /// The next row, or `None` at end of stream. An `Err` is terminal.
    pub async fn next_row(&mut self) -> Option<Result<Row, KsqlError>> {
        futures_util::StreamExt::next(self).await
    }
}

impl Stream for RowStream {
    type Item = Result<Row, KsqlError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl std::fmt::Debug for RowStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowStream").finish_non_exhaustive()
    }
}

/// A running streamed query: its schema, the server-assigned query id for
/// push queries, and the row stream.
#[derive(Debug)]
pub struct QueryResult {
    schema: Arc<ColumnSchema>,
    query_id: Option<String>,
    rows: RowStream,
}

impl QueryResult {
    pub fn schema(&self) -> &ColumnSchema {
        &self.schema
    }

    pub(crate) fn schema_arc(&self) -> &Arc<ColumnSchema> {
        &self.schema
    }

    /// Server-assigned id of the push query, absent for pull queries.
    pub fn query_id(&self) -> Option<&str> {
        self.query_id.as_deref()
    }

    pub async fn next_row(&mut self) -> Option<Result<Row, KsqlError>> {
        self.rows.next_row().await
    }

    pub fn cancel(&self) {
        self.rows.cancel();
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.rows.cancel_handle()
    }

    /// Consumes the result, keeping only the row stream.
    pub fn into_rows(self) -> RowStream {
        self.rows
    }

    /// Reads the schema header from `lines`, then spawns the row reader.
    /// Fails before returning a result if the header never arrives or does
    /// not parse, so a query that never starts is a synchronous error.
    ///
    /// [`Client`](crate::Client) calls this on a freshly opened response;
    /// it is public so decoding can be driven from any line source.
    pub async fn from_line_stream(
        mut lines: LineStream,
        capacity: usize,
    ) -> Result<QueryResult, KsqlError> {
        let header_line = loop {
            match lines.next_line().await {
                Some(Ok(text)) => {
                    if text.trim().is_empty() {
                        continue;
                    }
                    break text;
                }
                Some(Err(e)) => return Err(e),
                None => {
                    return Err(KsqlError::protocol(
                        "Stream ended before the schema header",
                    ))
                }
            }
        };

        let header: QueryStreamHeader = serde_json::from_str(&header_line)
            .map_err(|e| KsqlError::protocol(format!("Malformed schema header: {e}")))?;
        let schema =
            ColumnSchema::from_names_and_types(&header.column_names, &header.column_types)?;
        debug!(columns = schema.len(), query_id = ?header.query_id, "query_stream_started");

        let decode_schema = Arc::clone(&schema);
        let (inner, cancel) = spawn_decoder(lines, capacity, move |text| {
            let raw: serde_json::Value = serde_json::from_str(text)
                .map_err(|e| KsqlError::protocol(format!("Malformed row line: {e}")))?;
            decode_row(&decode_schema, &raw)
        });

        Ok(QueryResult {
            schema,
            query_id: header.query_id,
            rows: RowStream { inner, cancel },
        })
    }
}

/// Receipt for one inserted row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Acknowledgment {
    seq: i64,
}

impl Acknowledgment {
    /// Zero-based position of the acknowledged row in the sent sequence.
    pub fn seq(&self) -> i64 {
        self.seq
    }
}

/// Acknowledgments for an insert stream, one per sent row, in send order.
/// An error acknowledgment ends the stream.
pub struct AckStream {
    inner: Pipeline<Acknowledgment>,
    cancel: Arc<watch::Sender<bool>>,
}

impl AckStream {
    pub fn cancel(&self) {
        let _ = self.cancel.send(true);
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            cancel: Arc::clone(&self.cancel),
        }
    }

    /// The next acknowledgment, or `None` once the server closes the
    /// response. An `Err` is terminal.
    pub async fn next_ack(&mut self) -> Option<Result<Acknowledgment, KsqlError>> {
        futures_util::StreamExt::next(self).await
    }

    /// Spawns the acknowledgment reader over any line source.
    pub fn from_line_stream(lines: LineStream, capacity: usize) -> AckStream {
        let (inner, cancel) = spawn_decoder(lines, capacity, decode_ack);
        AckStream { inner, cancel }
    }
}

impl Stream for AckStream {
    type Item = Result<Acknowledgment, KsqlError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl std::fmt::Debug for AckStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AckStream").finish_non_exhaustive()
    }
}

fn decode_ack(text: &str) -> Result<Acknowledgment, KsqlError> {
    let ack: InsertAckLine = serde_json::from_str(text)
        .map_err(|e| KsqlError::protocol(format!("Malformed acknowledgment line: {e}")))?;
    match ack.status.as_str() {
        // An ok without a sequence number is malformed, not seq 0.
        "ok" => match ack.seq {
            Some(seq) => Ok(Acknowledgment { seq }),
            None => Err(KsqlError::protocol(
                "Acknowledgment is missing a sequence number",
            )),
        },
        "error" => Err(KsqlError::Protocol {
            message: ack
                .message
                .unwrap_or_else(|| "Insert was rejected by the server".to_string()),
            error_code: ack.error_code,
        }),
        other => Err(KsqlError::protocol(format!(
            "Unrecognized acknowledgment status: {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn test_query_header_then_rows() {
        let lines = LineStream::from_lines([
            r#"{"columnNames":["ID","NAME"],"columnTypes":["BIGINT","STRING"],"queryId":"q7"}"#,
            r#"[1,"a"]"#,
            r#"[2,"b"]"#,
        ]);
        let mut result = QueryResult::from_line_stream(lines, 8).await.unwrap();
        assert_eq!(result.query_id(), Some("q7"));
        assert_eq!(result.schema().len(), 2);

        let first = result.next_row().await.unwrap().unwrap();
        assert_eq!(first.get_i64(1), Some(1));
        assert_eq!(first.get_string(2), Some("a"));
        let second = result.next_row().await.unwrap().unwrap();
        assert_eq!(second.get_i64(1), Some(2));
        assert!(result.next_row().await.is_none());
    }

    #[tokio::test]
    async fn test_blank_lines_are_skipped() {
        let lines = LineStream::from_lines([
            "",
            r#"{"columnNames":["A"],"columnTypes":["INTEGER"]}"#,
            "  ",
            "[1]",
            "",
            "[2]",
        ]);
        let mut result = QueryResult::from_line_stream(lines, 8).await.unwrap();
        assert_eq!(result.next_row().await.unwrap().unwrap().get_i32(1), Some(1));
        assert_eq!(result.next_row().await.unwrap().unwrap().get_i32(1), Some(2));
        assert!(result.next_row().await.is_none());
    }

    #[tokio::test]
    async fn test_empty_stream_fails_before_result() {
        let lines = LineStream::from_lines(Vec::<String>::new());
        assert!(matches!(
            QueryResult::from_line_stream(lines, 8).await,
            Err(KsqlError::Protocol { .. })
        ));
    }

    #[tokio::test]
    async fn test_malformed_header_fails_before_result() {
        let lines = LineStream::from_lines([r#"{"columnNames":["A"]}"#]);
        assert!(matches!(
            QueryResult::from_line_stream(lines, 8).await,
            Err(KsqlError::Protocol { .. })
        ));
    }

    #[tokio::test]
    async fn test_rows_then_terminal_error() {
        let lines = LineStream::from_lines([
            r#"{"columnNames":["A"],"columnTypes":["INTEGER"]}"#,
            "[1]",
            "[1,2]",
            "[3]",
        ]);
        let mut result = QueryResult::from_line_stream(lines, 8).await.unwrap();
        assert!(result.next_row().await.unwrap().is_ok());
        assert!(matches!(
            result.next_row().await,
            Some(Err(KsqlError::Protocol { .. }))
        ));
        // Terminal: the well-formed row after the error is never delivered.
        assert!(result.next_row().await.is_none());
    }

    #[tokio::test]
    async fn test_cancel_discards_buffered_rows() {
        let lines = LineStream::from_lines([
            r#"{"columnNames":["A"],"columnTypes":["INTEGER"]}"#,
            "[1]",
            "[2]",
            "[3]",
        ]);
        let mut result = QueryResult::from_line_stream(lines, 8).await.unwrap();
        assert!(result.next_row().await.unwrap().is_ok());

        result.cancel();
        assert!(matches!(
            result.next_row().await,
            Some(Err(KsqlError::Cancelled))
        ));
        assert!(result.next_row().await.is_none());
    }

    #[tokio::test]
    async fn test_cancel_wakes_a_blocked_consumer() {
        let header = futures_util::stream::once(async {
            Ok(r#"{"columnNames":["A"],"columnTypes":["INTEGER"]}"#.to_string())
        });
        let lines = LineStream::new(header.chain(futures_util::stream::pending()));
        let mut result = QueryResult::from_line_stream(lines, 8).await.unwrap();

        let handle = result.cancel_handle();
        let waiter = tokio::spawn(async move { result.next_row().await });
        tokio::task::yield_now().await;
        handle.cancel();

        assert!(matches!(
            waiter.await.unwrap(),
            Some(Err(KsqlError::Cancelled))
        ));
    }

    #[tokio::test]
    async fn test_ack_stream_ok_sequence() {
        let lines = LineStream::from_lines([
            r#"{"status":"ok","seq":0}"#,
            r#"{"status":"ok","seq":1}"#,
        ]);
        let mut acks = AckStream::from_line_stream(lines, 8);
        assert_eq!(acks.next_ack().await.unwrap().unwrap().seq(), 0);
        assert_eq!(acks.next_ack().await.unwrap().unwrap().seq(), 1);
        assert!(acks.next_ack().await.is_none());
    }

    #[tokio::test]
    async fn test_ack_stream_error_is_terminal() {
        let lines = LineStream::from_lines([
            r#"{"status":"ok","seq":0}"#,
            r#"{"status":"error","seq":1,"error_code":40001,"message":"missing key"}"#,
            r#"{"status":"ok","seq":2}"#,
        ]);
        let mut acks = AckStream::from_line_stream(lines, 8);
        assert!(acks.next_ack().await.unwrap().is_ok());
        match acks.next_ack().await.unwrap() {
            Err(KsqlError::Protocol {
                message,
                error_code,
            }) => {
                assert_eq!(message, "missing key");
                assert_eq!(error_code, Some(40001));
            }
            other => panic!("expected Protocol, got {other:?}"),
        }
        assert!(acks.next_ack().await.is_none());
    }

    #[tokio::test]
    async fn test_ack_without_seq_is_protocol_error() {
        let lines = LineStream::from_lines([r#"{"status":"ok"}"#]);
        let mut acks = AckStream::from_line_stream(lines, 8);
        match acks.next_ack().await.unwrap() {
            Err(KsqlError::Protocol { message, .. }) => {
                assert!(message.contains("sequence number"));
            }
            other => panic!("expected Protocol, got {other:?}"),
        }
        assert!(acks.next_ack().await.is_none());
    }

    #[tokio::test]
    async fn test_ack_stream_unknown_status() {
        let lines = LineStream::from_lines([r#"{"status":"maybe","seq":0}"#]);
        let mut acks = AckStream::from_line_stream(lines, 8);
        assert!(matches!(
            acks.next_ack().await,
            Some(Err(KsqlError::Protocol { .. }))
        ));
    }
}
