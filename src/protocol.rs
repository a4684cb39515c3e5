//! Wire format types for the HTTP API.
//!
//! Request payloads are serialized with lowerCamelCase field names as the
//! server expects them; response payloads tolerate missing fields because
//! the `/ksql` endpoint returns a different subset per statement kind.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// POST body of `/query-stream`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct QueryStreamRequest {
    pub sql: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, serde_json::Value>,
}

/// First line of the `/inserts-stream` request body; every following line
/// is one row object.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct InsertStreamRequest {
    pub target: String,
}

/// POST body of `/ksql`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct KsqlRequest {
    pub ksql: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub streams_properties: BTreeMap<String, serde_json::Value>,
}

/// POST body of `/close-stream`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CloseStreamRequest {
    pub query_id: String,
}

/// First non-blank line of a `/query-stream` response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct QueryStreamHeader {
    pub column_names: Vec<String>,
    pub column_types: Vec<String>,
    #[serde(default)]
    pub query_id: Option<String>,
}

/// One acknowledgment line of the `/inserts-stream` response. An `ok`
/// acknowledgment without a `seq` is malformed.
#[derive(Debug, Deserialize)]
pub(crate) struct InsertAckLine {
    pub status: String,
    #[serde(default)]
    pub seq: Option<i64>,
    #[serde(default)]
    pub error_code: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Error body returned with non-success HTTP statuses.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub error_code: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
}

/// One entity of the `/ksql` response array. Only the fields relevant to
/// the issued statement are populated.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct KsqlResponseEntity {
    #[serde(default)]
    pub command_id: Option<String>,
    #[serde(default)]
    pub streams: Option<Vec<StreamTableEntry>>,
    #[serde(default)]
    pub tables: Option<Vec<StreamTableEntry>>,
    #[serde(default)]
    pub topics: Option<Vec<TopicEntry>>,
    #[serde(default)]
    pub queries: Option<Vec<QueryEntry>>,
    #[serde(default)]
    pub source_description: Option<SourceDescriptionEntity>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StreamTableEntry {
    pub name: String,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub is_windowed: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TopicEntry {
    pub name: String,
    #[serde(default)]
    pub replica_info: Vec<i32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct QueryEntry {
    pub id: String,
    #[serde(default)]
    pub query_string: Option<String>,
    #[serde(default)]
    pub sinks: Option<serde_json::Value>,
}

/// Payload of the `sourceDescription` entity returned for `DESCRIBE`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SourceDescriptionEntity {
    pub name: String,
    #[serde(rename = "type")]
    pub source_type: String,
    #[serde(default)]
    pub fields: Vec<SourceFieldEntry>,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub key_format: Option<String>,
    #[serde(default)]
    pub value_format: Option<String>,
    #[serde(default)]
    pub read_queries: Vec<QueryEntry>,
    #[serde(default)]
    pub write_queries: Vec<QueryEntry>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub window_type: Option<String>,
    #[serde(default)]
    pub statement: Option<String>,
}

/// One field of a described source. `type` is `"KEY"` for key columns and
/// absent for value columns.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SourceFieldEntry {
    pub name: String,
    pub schema: SourceFieldSchema,
    #[serde(default, rename = "type")]
    pub field_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SourceFieldSchema {
    #[serde(rename = "type")]
    pub type_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_stream_request_omits_empty_properties() {
        let request = QueryStreamRequest {
            sql: "SELECT * FROM S;".to_string(),
            properties: BTreeMap::new(),
        };
        assert_eq!(
            serde_json::to_string(&request).unwrap(),
            r#"{"sql":"SELECT * FROM S;"}"#
        );
    }

    #[test]
    fn test_query_stream_request_with_properties() {
        let mut properties = BTreeMap::new();
        properties.insert(
            "auto.offset.reset".to_string(),
            serde_json::Value::from("earliest"),
        );
        let request = QueryStreamRequest {
            sql: "SELECT 1;".to_string(),
            properties,
        };
        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&request).unwrap()).unwrap();
        assert_eq!(json["properties"]["auto.offset.reset"], "earliest");
    }

    #[test]
    fn test_query_stream_header_without_query_id() {
        let header: QueryStreamHeader =
            serde_json::from_str(r#"{"columnNames":["A"],"columnTypes":["INTEGER"]}"#).unwrap();
        assert_eq!(header.column_names, vec!["A"]);
        assert!(header.query_id.is_none());
    }

    #[test]
    fn test_insert_ack_line_ok() {
        let ack: InsertAckLine = serde_json::from_str(r#"{"status":"ok","seq":3}"#).unwrap();
        assert_eq!(ack.status, "ok");
        assert_eq!(ack.seq, Some(3));
        assert!(ack.error_code.is_none());
    }

    #[test]
    fn test_insert_ack_line_without_seq() {
        let ack: InsertAckLine = serde_json::from_str(r#"{"status":"ok"}"#).unwrap();
        assert_eq!(ack.seq, None);
    }

    #[test]
    fn test_insert_ack_line_error() {
        let ack: InsertAckLine =
            serde_json::from_str(r#"{"status":"error","error_code":40000,"message":"x"}"#)
                .unwrap();
        assert_eq!(ack.status, "error");
        assert_eq!(ack.error_code, Some(40000));
        assert_eq!(ack.message.as_deref(), Some("x"));
    }

    #[test]
    fn test_ksql_response_entity_partial_fields() {
        let entity: KsqlResponseEntity = serde_json::from_str(
            r#"{"@type":"streams","statementText":"LIST STREAMS;","streams":[{"name":"S","topic":"t","format":"JSON"}]}"#,
        )
        .unwrap();
        let streams = entity.streams.unwrap();
        assert_eq!(streams.len(), 1);
        assert_eq!(streams[0].name, "S");
        assert!(entity.command_id.is_none());
    }

    #[test]
    fn test_source_description_entity() {
        let entity: KsqlResponseEntity = serde_json::from_str(
            r#"{"@type":"sourceDescription","statementText":"DESCRIBE ORDERS;","sourceDescription":{
                "name":"ORDERS","type":"STREAM","topic":"orders",
                "keyFormat":"KAFKA","valueFormat":"JSON","timestamp":"",
                "windowType":null,
                "statement":"CREATE STREAM ORDERS ...;",
                "fields":[
                    {"name":"ID","schema":{"type":"BIGINT"},"type":"KEY"},
                    {"name":"ITEM","schema":{"type":"STRING"}}
                ],
                "readQueries":[{"id":"q1","queryString":"SELECT ...","sinks":[]}],
                "writeQueries":[]
            }}"#,
        )
        .unwrap();
        let description = entity.source_description.unwrap();
        assert_eq!(description.name, "ORDERS");
        assert_eq!(description.source_type, "STREAM");
        assert_eq!(description.fields.len(), 2);
        assert_eq!(description.fields[0].schema.type_name, "BIGINT");
        assert_eq!(description.fields[0].field_type.as_deref(), Some("KEY"));
        assert!(description.fields[1].field_type.is_none());
        assert_eq!(description.read_queries.len(), 1);
    }

    #[test]
    fn test_close_stream_request_shape() {
        let request = CloseStreamRequest {
            query_id: "q1".to_string(),
        };
        assert_eq!(
            serde_json::to_string(&request).unwrap(),
            r#"{"queryId":"q1"}"#
        );
    }
}
