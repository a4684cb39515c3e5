//! The client facade.
//!
//! One [`Client`] is bound to one server and holds no per-query state, so
//! it can be shared and used concurrently. Statement validation happens
//! before any network activity: a malformed statement fails with
//! [`KsqlError::Validation`] without touching the server.

use crate::config::ClientConfig;
use crate::error::KsqlError;
use crate::protocol::{
    KsqlRequest, KsqlResponseEntity, QueryEntry, QueryStreamRequest, SourceDescriptionEntity,
};
use crate::row::Row;
use crate::schema::ColumnSchema;
use crate::stream::{AckStream, Acknowledgment, QueryResult};
use crate::transport::HttpTransport;
use crate::value::KsqlObject;
use futures_util::Stream;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Per-request server properties, e.g. `auto.offset.reset`.
pub type Properties = BTreeMap<String, serde_json::Value>;

/// Client for one ksqlDB server.
#[derive(Debug)]
pub struct Client {
    config: ClientConfig,
    transport: HttpTransport,
}

impl Client {
    /// Builds a client from a validated configuration.
    pub fn new(config: ClientConfig) -> Result<Self, KsqlError> {
        config.validate()?;
        let transport = HttpTransport::new(&config)?;
        Ok(Client { config, transport })
    }

    /// Builds a client for `server_url` with default settings.
    pub fn connect(server_url: impl Into<String>) -> Result<Self, KsqlError> {
        Client::new(ClientConfig::new(server_url))
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Runs a query and streams its rows as they arrive. Works for both
    /// push queries (`EMIT CHANGES`) and pull queries.
    ///
    /// The returned [`QueryResult`] carries the response schema; the call
    /// itself fails if the connection cannot be established or the server
    /// rejects the statement, so a returned result means the query started.
    pub async fn stream_query(&self, sql: &str) -> Result<QueryResult, KsqlError> {
        self.stream_query_with_properties(sql, Properties::new())
            .await
    }

    /// [`stream_query`](Client::stream_query) with per-request server
    /// properties.
    pub async fn stream_query_with_properties(
        &self,
        sql: &str,
        properties: Properties,
    ) -> Result<QueryResult, KsqlError> {
        validate_statement(sql)?;
        let lines = self
            .transport
            .open_query_stream(&QueryStreamRequest {
                sql: sql.trim().to_string(),
                properties,
            })
            .await?;
        QueryResult::from_line_stream(lines, self.config.buffer_capacity).await
    }

    /// Runs a bounded query and collects every row before returning.
    ///
    /// A push query without a `LIMIT` clause never completes, so it is
    /// rejected with [`KsqlError::Validation`] before any network activity;
    /// use [`stream_query`](Client::stream_query) for unbounded queries.
    pub async fn batch_query(&self, sql: &str) -> Result<BatchedQueryResult, KsqlError> {
        self.batch_query_with_properties(sql, Properties::new())
            .await
    }

    /// [`batch_query`](Client::batch_query) with per-request server
    /// properties.
    pub async fn batch_query_with_properties(
        &self,
        sql: &str,
        properties: Properties,
    ) -> Result<BatchedQueryResult, KsqlError> {
        validate_statement(sql)?;
        if is_unbounded_push(sql) {
            return Err(KsqlError::validation(
                "Push query without a LIMIT clause never completes; \
                 add LIMIT or use stream_query",
            ));
        }

        let mut result = self
            .stream_query_with_properties(sql, properties)
            .await?;
        let mut rows = Vec::new();
        while let Some(row) = result.next_row().await {
            rows.push(row?);
        }
        debug!(rows = rows.len(), "batch_query_complete");
        Ok(BatchedQueryResult {
            schema: Arc::clone(result.schema_arc()),
            query_id: result.query_id().map(str::to_string),
            rows,
        })
    }

    /// Opens an insert stream into `target` and returns the acknowledgment
    /// stream. Row objects are sent as the given stream yields them; the
    /// server acknowledges each row in send order.
    pub async fn stream_inserts(
        &self,
        target: &str,
        rows: impl Stream<Item = KsqlObject> + Send + 'static,
    ) -> Result<AckStream, KsqlError> {
        if target.trim().is_empty() {
            return Err(KsqlError::validation("Insert target must not be empty"));
        }
        let lines = self.transport.open_insert_stream(target.trim(), rows).await?;
        Ok(AckStream::from_line_stream(lines, self.config.buffer_capacity))
    }

    /// Inserts a single row and waits for its acknowledgment.
    pub async fn insert_row(
        &self,
        target: &str,
        row: KsqlObject,
    ) -> Result<Acknowledgment, KsqlError> {
        let mut acks = self
            .stream_inserts(target, futures_util::stream::iter([row]))
            .await?;
        match acks.next_ack().await {
            Some(ack) => ack,
            None => Err(KsqlError::protocol(
                "Acknowledgment for the inserted row was not received",
            )),
        }
    }

    /// Executes a DDL/DML statement (`CREATE`, `DROP`, `INSERT INTO ...
    /// SELECT`, ...) via the statement endpoint.
    pub async fn execute_statement(
        &self,
        sql: &str,
    ) -> Result<ExecuteStatementResult, KsqlError> {
        self.execute_statement_with_properties(sql, Properties::new())
            .await
    }

    /// [`execute_statement`](Client::execute_statement) with per-request
    /// server properties.
    pub async fn execute_statement_with_properties(
        &self,
        sql: &str,
        properties: Properties,
    ) -> Result<ExecuteStatementResult, KsqlError> {
        validate_statement(sql)?;
        let entities = self
            .transport
            .post_ksql(&KsqlRequest {
                ksql: sql.trim().to_string(),
                streams_properties: properties,
            })
            .await?;
        Ok(ExecuteStatementResult {
            command_id: entities.into_iter().next().and_then(|e| e.command_id),
        })
    }

    /// Terminates a persistent or push query by id.
    pub async fn terminate_push_query(&self, query_id: &str) -> Result<(), KsqlError> {
        if query_id.trim().is_empty() {
            return Err(KsqlError::validation("Query id must not be empty"));
        }
        self.transport
            .post_ksql(&KsqlRequest {
                ksql: format!("TERMINATE {};", query_id.trim()),
                streams_properties: Properties::new(),
            })
            .await?;
        Ok(())
    }

    /// Asks the server to close a streaming response by query id. The
    /// client-side stream then ends on its own; use
    /// [`RowStream::cancel`](crate::RowStream::cancel) to stop consuming
    /// without a server round trip.
    pub async fn close_stream(&self, query_id: &str) -> Result<(), KsqlError> {
        if query_id.trim().is_empty() {
            return Err(KsqlError::validation("Query id must not be empty"));
        }
        self.transport.post_close_stream(query_id.trim()).await
    }

    /// Lists the streams defined on the server.
    pub async fn list_streams(&self) -> Result<Vec<StreamTableInfo>, KsqlError> {
        let entity = self.first_entity("LIST STREAMS;").await?;
        let entries = entity
            .streams
            .ok_or_else(|| KsqlError::protocol("Malformed LIST STREAMS response"))?;
        Ok(entries.into_iter().map(StreamTableInfo::from_entry).collect())
    }

    /// Lists the tables defined on the server.
    pub async fn list_tables(&self) -> Result<Vec<StreamTableInfo>, KsqlError> {
        let entity = self.first_entity("LIST TABLES;").await?;
        let entries = entity
            .tables
            .ok_or_else(|| KsqlError::protocol("Malformed LIST TABLES response"))?;
        Ok(entries.into_iter().map(StreamTableInfo::from_entry).collect())
    }

    /// Lists the Kafka topics the server can see.
    pub async fn list_topics(&self) -> Result<Vec<TopicInfo>, KsqlError> {
        let entity = self.first_entity("LIST TOPICS;").await?;
        let entries = entity
            .topics
            .ok_or_else(|| KsqlError::protocol("Malformed LIST TOPICS response"))?;
        Ok(entries
            .into_iter()
            .map(|t| TopicInfo {
                name: t.name,
                replica_info: t.replica_info,
            })
            .collect())
    }

    /// Lists the queries currently running on the server.
    pub async fn list_queries(&self) -> Result<Vec<QueryInfo>, KsqlError> {
        let entity = self.first_entity("LIST QUERIES;").await?;
        let entries = entity
            .queries
            .ok_or_else(|| KsqlError::protocol("Malformed LIST QUERIES response"))?;
        Ok(entries.into_iter().map(QueryInfo::from_entry).collect())
    }

    /// Describes a stream or table: its fields, backing topic,
    /// serialization formats, and the queries reading from and writing to
    /// it.
    pub async fn describe_source(&self, name: &str) -> Result<SourceDescription, KsqlError> {
        if name.trim().is_empty() {
            return Err(KsqlError::validation("Source name must not be empty"));
        }
        let entity = self
            .first_entity(&format!("DESCRIBE {};", name.trim()))
            .await?;
        let description = entity
            .source_description
            .ok_or_else(|| KsqlError::protocol("Malformed DESCRIBE response"))?;
        SourceDescription::from_entity(description)
    }

    async fn first_entity(&self, sql: &str) -> Result<KsqlResponseEntity, KsqlError> {
        let entities = self
            .transport
            .post_ksql(&KsqlRequest {
                ksql: sql.to_string(),
                streams_properties: Properties::new(),
            })
            .await?;
        entities
            .into_iter()
            .next()
            .ok_or_else(|| KsqlError::protocol("Empty statement response"))
    }
}

/// Result of a completed [`Client::batch_query`].
#[derive(Debug)]
pub struct BatchedQueryResult {
    schema: Arc<ColumnSchema>,
    query_id: Option<String>,
    rows: Vec<Row>,
}

impl BatchedQueryResult {
    pub fn schema(&self) -> &ColumnSchema {
        &self.schema
    }

    pub fn query_id(&self) -> Option<&str> {
        self.query_id.as_deref()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Result of [`Client::execute_statement`].
#[derive(Debug, Clone)]
pub struct ExecuteStatementResult {
    command_id: Option<String>,
}

impl ExecuteStatementResult {
    /// Server-assigned command id, when the statement produced one.
    pub fn command_id(&self) -> Option<&str> {
        self.command_id.as_deref()
    }
}

/// One stream or table, as reported by `LIST STREAMS` / `LIST TABLES`.
#[derive(Debug, Clone)]
pub struct StreamTableInfo {
    pub name: String,
    pub topic: Option<String>,
    pub format: Option<String>,
    pub is_windowed: Option<bool>,
}

impl StreamTableInfo {
    fn from_entry(entry: crate::protocol::StreamTableEntry) -> Self {
        StreamTableInfo {
            name: entry.name,
            topic: entry.topic,
            format: entry.format,
            is_windowed: entry.is_windowed,
        }
    }
}

/// One Kafka topic, as reported by `LIST TOPICS`.
#[derive(Debug, Clone)]
pub struct TopicInfo {
    pub name: String,
    pub replica_info: Vec<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    /// Transient client query; ends when its stream closes.
    Push,
    /// Server-side query writing into a sink.
    Persistent,
}

/// One running query, as reported by `LIST QUERIES` and `DESCRIBE`.
#[derive(Debug, Clone)]
pub struct QueryInfo {
    pub id: String,
    pub query_string: Option<String>,
    pub query_type: QueryType,
}

impl QueryInfo {
    fn from_entry(entry: QueryEntry) -> Self {
        let query_type = match &entry.sinks {
            Some(serde_json::Value::Array(sinks)) if !sinks.is_empty() => QueryType::Persistent,
            Some(serde_json::Value::String(s)) if !s.is_empty() => QueryType::Persistent,
            _ => QueryType::Push,
        };
        QueryInfo {
            id: entry.id,
            query_string: entry.query_string,
            query_type,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceType {
    Stream,
    Table,
}

/// One field of a described source. `type_name` is the server's type
/// keyword for the field (`BIGINT`, `ARRAY`, ...).
#[derive(Debug, Clone)]
pub struct FieldInfo {
    pub name: String,
    pub type_name: String,
    /// True for key columns, false for value columns.
    pub is_key: bool,
}

/// Metadata for one stream or table, as reported by `DESCRIBE`.
#[derive(Debug, Clone)]
pub struct SourceDescription {
    pub name: String,
    pub source_type: SourceType,
    pub fields: Vec<FieldInfo>,
    pub topic: Option<String>,
    pub key_format: Option<String>,
    pub value_format: Option<String>,
    pub read_queries: Vec<QueryInfo>,
    pub write_queries: Vec<QueryInfo>,
    /// Column configured as the source's TIMESTAMP, when one is set.
    pub timestamp_column: Option<String>,
    /// Window kind (`TUMBLING`, `HOPPING`, `SESSION`) for windowed tables.
    pub window_type: Option<String>,
    /// Canonical statement text that recreates this source.
    pub sql_statement: Option<String>,
}

impl SourceDescription {
    fn from_entity(entity: SourceDescriptionEntity) -> Result<Self, KsqlError> {
        let source_type = match entity.source_type.to_ascii_uppercase().as_str() {
            "STREAM" => SourceType::Stream,
            "TABLE" => SourceType::Table,
            other => {
                return Err(KsqlError::protocol(format!(
                    "Unrecognized source type: {other}"
                )))
            }
        };
        Ok(SourceDescription {
            name: entity.name,
            source_type,
            fields: entity
                .fields
                .into_iter()
                .map(|f| FieldInfo {
                    name: f.name,
                    type_name: f.schema.type_name,
                    is_key: f.field_type.as_deref() == Some("KEY"),
                })
                .collect(),
            topic: entity.topic,
            key_format: entity.key_format,
            value_format: entity.value_format,
            read_queries: entity
                .read_queries
                .into_iter()
                .map(QueryInfo::from_entry)
                .collect(),
            write_queries: entity
                .write_queries
                .into_iter()
                .map(QueryInfo::from_entry)
                .collect(),
            timestamp_column: entity.timestamp.filter(|t| !t.is_empty()),
            window_type: entity.window_type,
            sql_statement: entity.statement,
        })
    }
}

/// A statement is non-empty and carries exactly one semicolon, at the end.
fn validate_statement(sql: &str) -> Result<(), KsqlError> {
    let trimmed = sql.trim();
    if trimmed.is_empty() {
        return Err(KsqlError::validation("Statement must not be empty"));
    }
    if !trimmed.ends_with(';') {
        return Err(KsqlError::validation(
            "Statement must end with a semicolon",
        ));
    }
    if trimmed[..trimmed.len() - 1].contains(';') {
        return Err(KsqlError::validation(
            "Statement must contain a single trailing semicolon",
        ));
    }
    Ok(())
}

/// True for a push query (`EMIT CHANGES`) with no later `LIMIT <n>`.
/// Token-based so arbitrary whitespace and line breaks do not hide the
/// clause.
fn is_unbounded_push(sql: &str) -> bool {
    let upper = sql.to_uppercase();
    let tokens: Vec<&str> = upper
        .split_whitespace()
        .map(|t| t.trim_matches(|c| c == ';' || c == ','))
        .collect();

    let Some(emit) = tokens
        .windows(2)
        .position(|w| w[0] == "EMIT" && w[1] == "CHANGES")
    else {
        return false;
    };

    !tokens[emit + 2..].windows(2).any(|w| {
        w[0] == "LIMIT" && !w[1].is_empty() && w[1].chars().all(|c| c.is_ascii_digit())
    })
}
