//! # ksqlDB Client
//!
//! Async client for the ksqlDB HTTP API: streamed and batched queries over
//! `/query-stream`, row inserts with per-row acknowledgments over
//! `/inserts-stream`, and statements and listings over `/ksql`.
//!
//! ## Pipeline Architecture
//!
//! ```text
//! Chunked HTTP response body
//!     ↓
//! [LineStream]        → raw text lines
//!     ↓
//! [Schema header]     → ColumnSchema (column names + declared types)
//!     ↓
//! [Row decoding]      → KsqlValue per column, Null on kind mismatch
//!     ↓
//! [Bounded channel]   → backpressure + cooperative cancellation
//!     ↓
//! RowStream / AckStream
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ksqldb::{Client, KsqlObject, KsqlValue};
//!
//! let client = Client::connect("http://localhost:8088")?;
//!
//! // Stream a push query
//! let mut result = client
//!     .stream_query("SELECT * FROM ORDERS EMIT CHANGES;")
//!     .await?;
//! while let Some(row) = result.next_row().await {
//!     let row = row?;
//!     println!("{} -> {}", row.get_string(1).unwrap_or(""), row.get(2));
//! }
//!
//! // Insert a row and wait for its acknowledgment
//! let ack = client
//!     .insert_row(
//!         "ORDERS",
//!         KsqlObject::new()
//!             .insert("ID", KsqlValue::Bigint(1))
//!             .insert("ITEM", KsqlValue::from("socks")),
//!     )
//!     .await?;
//! assert_eq!(ack.seq(), 0);
//! ```
//!
//! Decoding is schema-driven: the first response line declares column names
//! and types, every following line is a positional JSON array decoded
//! against those declarations. A value that does not match its declared
//! type degrades to [`KsqlValue::Null`]; structural violations terminate
//! the stream with [`KsqlError::Protocol`].

pub mod client;
pub mod config;
pub mod error;
pub mod row;
pub mod schema;
pub mod stream;
pub mod transport;
pub mod value;

mod protocol;

pub use client::{
    BatchedQueryResult, Client, ExecuteStatementResult, FieldInfo, Properties, QueryInfo,
    QueryType, SourceDescription, SourceType, StreamTableInfo, TopicInfo,
};
pub use config::ClientConfig;
pub use error::KsqlError;
pub use row::Row;
pub use schema::{Column, ColumnSchema, ColumnType};
pub use stream::{AckStream, Acknowledgment, CancelHandle, QueryResult, RowStream};
pub use transport::LineStream;
pub use value::{KsqlObject, KsqlValue};
