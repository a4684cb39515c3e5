//! Client-side request validation.
//!
//! Every rejection here must happen before any network activity, so these
//! run against a client pointed at an address nothing listens on.

use ksqldb::{Client, ClientConfig, KsqlError, KsqlObject};

fn offline_client() -> Client {
    // Reserved TEST-NET-1 address; validation errors must fire before any
    // connection attempt.
    Client::connect("http://192.0.2.1:8088").unwrap()
}

fn assert_validation(err: KsqlError) {
    assert!(
        matches!(err, KsqlError::Validation { .. }),
        "expected Validation, got {err:?}"
    );
}

#[tokio::test]
async fn test_empty_statement_rejected() {
    let client = offline_client();
    assert_validation(client.stream_query("   ").await.unwrap_err());
}

#[tokio::test]
async fn test_statement_without_semicolon_rejected() {
    let client = offline_client();
    assert_validation(client.stream_query("SELECT * FROM S").await.unwrap_err());
}

#[tokio::test]
async fn test_multiple_statements_rejected() {
    let client = offline_client();
    assert_validation(
        client
            .batch_query("SELECT 1; SELECT 2;")
            .await
            .unwrap_err(),
    );
}

#[tokio::test]
async fn test_unbounded_push_query_rejected_for_batch() {
    let client = offline_client();
    assert_validation(
        client
            .batch_query("SELECT * FROM ORDERS EMIT CHANGES;")
            .await
            .unwrap_err(),
    );
    // Formatting must not hide the clause.
    assert_validation(
        client
            .batch_query("select * from orders\n  emit\n  changes;")
            .await
            .unwrap_err(),
    );
}

#[tokio::test]
async fn test_empty_insert_target_rejected() {
    let client = offline_client();
    assert_validation(
        client
            .insert_row("  ", KsqlObject::new())
            .await
            .unwrap_err(),
    );
}

#[tokio::test]
async fn test_empty_source_name_rejected() {
    let client = offline_client();
    assert_validation(client.describe_source("  ").await.unwrap_err());
}

#[tokio::test]
async fn test_empty_query_id_rejected() {
    let client = offline_client();
    assert_validation(client.terminate_push_query("").await.unwrap_err());
    assert_validation(client.close_stream("  ").await.unwrap_err());
}

#[test]
fn test_client_rejects_invalid_config() {
    let config = ClientConfig {
        buffer_capacity: 0,
        ..ClientConfig::default()
    };
    assert!(matches!(
        Client::new(config),
        Err(KsqlError::Validation { .. })
    ));
}

#[test]
fn test_connect_normalizes_url() {
    let client = Client::connect("http://example:8088/").unwrap();
    assert_eq!(client.config().server_url, "http://example:8088");
}
