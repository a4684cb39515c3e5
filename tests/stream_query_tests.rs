//! End-to-end query stream decoding, driven through in-memory line streams.
//!
//! These cover the full path a `/query-stream` response body takes: header
//! parsing, schema-driven row decoding, terminal-error semantics, and
//! cooperative cancellation.

use ksqldb::{KsqlError, KsqlValue, LineStream, QueryResult, Row};

async fn start(lines: &[&'static str]) -> Result<QueryResult, KsqlError> {
    QueryResult::from_line_stream(LineStream::from_lines(lines.to_vec()), 200).await
}

async fn drain(mut result: QueryResult) -> Vec<Result<Row, KsqlError>> {
    let mut items = Vec::new();
    while let Some(item) = result.next_row().await {
        items.push(item);
    }
    items
}

#[tokio::test]
async fn test_push_query_response_end_to_end() {
    let mut result = start(&[
        r#"{"columnNames":["ID","AMOUNTS","ADDRESS"],"columnTypes":["BIGINT","ARRAY<DOUBLE>","STRUCT<CITY STRING, ZIP INTEGER>"],"queryId":"transient_123"}"#,
        r#"[1,[1.5,2.5],{"CITY":"Oslo","ZIP":1234}]"#,
        r#"[2,[],{"CITY":"Kyiv","ZIP":null}]"#,
    ])
    .await
    .unwrap();

    assert_eq!(result.query_id(), Some("transient_123"));
    assert_eq!(result.schema().len(), 3);
    assert_eq!(result.schema().columns()[0].name, "ID");

    let first = result.next_row().await.unwrap().unwrap();
    assert_eq!(first.get_i64(1), Some(1));
    assert_eq!(
        first.get_array(2),
        Some(&[KsqlValue::Double(1.5), KsqlValue::Double(2.5)][..])
    );
    let address = first.get_object(3).unwrap();
    assert_eq!(address.get("CITY"), Some(&KsqlValue::from("Oslo")));
    assert_eq!(address.get("ZIP"), Some(&KsqlValue::Integer(1234)));

    let second = result.next_row().await.unwrap().unwrap();
    assert!(second.get_object(3).unwrap().get("ZIP").unwrap().is_null());

    assert!(result.next_row().await.is_none());
}

#[tokio::test]
async fn test_pull_query_has_no_query_id() {
    let result = start(&[
        r#"{"columnNames":["A"],"columnTypes":["INTEGER"]}"#,
        "[7]",
    ])
    .await
    .unwrap();
    assert_eq!(result.query_id(), None);
    let rows = drain(result).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].as_ref().unwrap().get_i32(1), Some(7));
}

#[tokio::test]
async fn test_unsupported_column_type_fails_the_query() {
    let err = start(&[r#"{"columnNames":["A"],"columnTypes":["BYTES"]}"#])
        .await
        .unwrap_err();
    assert!(matches!(err, KsqlError::UnsupportedType { fragment } if fragment == "BYTES"));
}

#[tokio::test]
async fn test_duplicate_column_names_fail_the_query() {
    let err = start(&[
        r#"{"columnNames":["A","A"],"columnTypes":["INTEGER","STRING"]}"#,
    ])
    .await
    .unwrap_err();
    assert!(matches!(err, KsqlError::Protocol { .. }));
}

#[tokio::test]
async fn test_rows_before_terminal_error_are_delivered() {
    let result = start(&[
        r#"{"columnNames":["A"],"columnTypes":["INTEGER"]}"#,
        "[1]",
        "[2]",
        "not json",
        "[3]",
    ])
    .await
    .unwrap();

    let items = drain(result).await;
    assert_eq!(items.len(), 3);
    assert_eq!(items[0].as_ref().unwrap().get_i32(1), Some(1));
    assert_eq!(items[1].as_ref().unwrap().get_i32(1), Some(2));
    assert!(matches!(items[2], Err(KsqlError::Protocol { .. })));
}

#[tokio::test]
async fn test_transport_failure_after_rows_is_terminal() {
    let lines = LineStream::new(futures_util::stream::iter([
        Ok(r#"{"columnNames":["A"],"columnTypes":["INTEGER"]}"#.to_string()),
        Ok("[1]".to_string()),
        Ok("[2]".to_string()),
        Err(KsqlError::Transport {
            message: "connection reset by peer".to_string(),
            status: None,
        }),
    ]));
    let result = QueryResult::from_line_stream(lines, 200).await.unwrap();

    let items = drain(result).await;
    assert_eq!(items.len(), 3);
    assert_eq!(items[0].as_ref().unwrap().get_i32(1), Some(1));
    assert_eq!(items[1].as_ref().unwrap().get_i32(1), Some(2));
    match &items[2] {
        Err(KsqlError::Transport { message, .. }) => {
            assert_eq!(message, "connection reset by peer");
        }
        other => panic!("expected Transport error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_transport_failure_before_header_is_synchronous() {
    let lines = LineStream::new(futures_util::stream::iter([Err(KsqlError::Transport {
        message: "connection refused".to_string(),
        status: None,
    })]));
    let err = QueryResult::from_line_stream(lines, 200).await.unwrap_err();
    assert!(matches!(err, KsqlError::Transport { .. }));
}

#[tokio::test]
async fn test_mismatched_values_degrade_per_column() {
    let result = start(&[
        r#"{"columnNames":["I","S"],"columnTypes":["INTEGER","STRING"]}"#,
        r#"["oops",42]"#,
    ])
    .await
    .unwrap();
    let rows = drain(result).await;
    let row = rows[0].as_ref().unwrap();
    assert!(row.is_null(1));
    assert!(row.is_null(2));
}

#[tokio::test]
async fn test_cancellation_ends_the_stream() {
    let mut result = start(&[
        r#"{"columnNames":["A"],"columnTypes":["INTEGER"]}"#,
        "[1]",
        "[2]",
        "[3]",
    ])
    .await
    .unwrap();

    assert!(result.next_row().await.unwrap().is_ok());
    result.cancel();

    match result.next_row().await {
        Some(Err(err)) => assert!(err.is_cancelled()),
        other => panic!("expected cancellation, got {other:?}"),
    }
    assert!(result.next_row().await.is_none());
}

#[tokio::test]
async fn test_row_to_object_round_trip() {
    let result = start(&[
        r#"{"columnNames":["NAME","AGE"],"columnTypes":["STRING","INTEGER"]}"#,
        r#"["k",3]"#,
    ])
    .await
    .unwrap();
    let rows = drain(result).await;
    let object = rows[0].as_ref().unwrap().to_object();
    assert_eq!(object.get("NAME"), Some(&KsqlValue::from("k")));
    assert_eq!(object.get("AGE"), Some(&KsqlValue::Integer(3)));
    assert_eq!(object.keys().collect::<Vec<_>>(), vec!["NAME", "AGE"]);
}
