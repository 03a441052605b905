//! JSON-RPC protocol tests for the Odoo connector, against a mock server.

use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use sales_intel_core::config::{OdooConfig, SyncSettings};
use sales_intel_core::error::SalesIntelError;
use sales_intel_core::models::EntityType;
use sales_intel_engine::odoo::{OdooConnector, SourceConnector};

fn connector(server: &MockServer, page_size: u32) -> OdooConnector {
    let config = OdooConfig {
        base_url: server.uri(),
        database: "sales".into(),
        username: "svc@corp.io".into(),
        api_key: "key".into(),
    };
    let settings = SyncSettings {
        page_size,
        max_page_retries: 2,
        ..SyncSettings::default()
    };
    OdooConnector::new(config, &settings).unwrap()
}

async fn mount_auth(server: &MockServer, uid: i64) {
    Mock::given(method("POST"))
        .and(path("/jsonrpc"))
        .and(body_string_contains("authenticate"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": 1, "result": uid
            })),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn authenticates_with_numeric_uid() {
    let server = MockServer::start().await;
    mount_auth(&server, 7).await;

    let connector = connector(&server, 100);
    assert_eq!(connector.authenticate().await.unwrap(), 7);
}

#[tokio::test]
async fn false_result_means_invalid_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/jsonrpc"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": 1, "result": false
            })),
        )
        .mount(&server)
        .await;

    let err = connector(&server, 100).authenticate().await.unwrap_err();
    match err {
        SalesIntelError::Authentication { message, .. } => {
            assert!(message.contains("invalid credentials"))
        }
        other => panic!("expected authentication error, got {other}"),
    }
}

#[tokio::test]
async fn error_objects_surface_their_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/jsonrpc"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": 1,
                "error": {"message": "Odoo Server Error", "data": {"message": "database does not exist"}}
            })),
        )
        .mount(&server)
        .await;

    let err = connector(&server, 100).authenticate().await.unwrap_err();
    match err {
        SalesIntelError::Authentication { message, .. } => {
            assert!(message.contains("database does not exist"))
        }
        other => panic!("expected authentication error, got {other}"),
    }
}

#[tokio::test]
async fn pages_until_exhausted() {
    let server = MockServer::start().await;
    mount_auth(&server, 7).await;

    Mock::given(method("POST"))
        .and(path("/jsonrpc"))
        .and(body_string_contains("search_read"))
        .and(body_string_contains("\"offset\":0"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": 2,
                "result": [{"id": 1, "name": "a"}, {"id": 2, "name": "b"}]
            })),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/jsonrpc"))
        .and(body_string_contains("search_read"))
        .and(body_string_contains("\"offset\":2"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": 3,
                "result": [{"id": 3, "name": "c"}]
            })),
        )
        .mount(&server)
        .await;

    let connector = connector(&server, 2);
    let records = connector
        .fetch_entities(EntityType::Account)
        .await
        .unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(records[2]["id"], 3);
}

#[tokio::test]
async fn server_errors_are_retried_with_backoff() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/jsonrpc"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_auth(&server, 9).await;

    let connector = connector(&server, 100);
    assert_eq!(connector.authenticate().await.unwrap(), 9);
}

#[tokio::test]
async fn exhausted_retries_become_a_connection_fault() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/jsonrpc"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = connector(&server, 100).authenticate().await.unwrap_err();
    assert!(matches!(err, SalesIntelError::Connection { .. }));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn unauthorized_is_terminal_not_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/jsonrpc"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = connector(&server, 100).authenticate().await.unwrap_err();
    assert!(matches!(err, SalesIntelError::Authentication { .. }));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn model_call_errors_name_the_call() {
    let server = MockServer::start().await;
    mount_auth(&server, 7).await;
    Mock::given(method("POST"))
        .and(path("/jsonrpc"))
        .and(body_string_contains("search_read"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": 2,
                "error": {"message": "Invalid field", "data": {"message": "Invalid field 'bogus' on model 'crm.lead'"}}
            })),
        )
        .mount(&server)
        .await;

    let err = connector(&server, 100)
        .fetch_entities(EntityType::Opportunity)
        .await
        .unwrap_err();
    match err {
        SalesIntelError::Connection { message, .. } => {
            assert!(message.contains("crm.lead"));
        }
        other => panic!("expected connection error, got {other}"),
    }
}
