use super::*;
use async_trait::async_trait;
use httpmock::prelude::*;
use reqwest::Client;
use reqwest_middleware::ClientBuilder;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;

struct StaticToken(&'static str);

#[async_trait]
impl TokenSource for StaticToken {
    async fn access_token(&self) -> Result<String, anyhow::Error> {
        Ok(self.0.to_string())
    }
}

struct FailingToken;

#[async_trait]
impl TokenSource for FailingToken {
    async fn access_token(&self) -> Result<String, anyhow::Error> {
        Err(anyhow::anyhow!("no credentials"))
    }
}

fn database_for(server: &MockServer) -> FirebaseDatabase {
    FirebaseDatabase::new(ClientBuilder::new(Client::new()).build(), &server.base_url(), None)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Dinosaur {
    height: f64,
    length: f64,
    order: String,
}

fn stegosaurus() -> Dinosaur {
    Dinosaur {
        height: 4.0,
        length: 9.0,
        order: "ornithischia".to_string(),
    }
}

#[test]
fn test_reference_urls() {
    let db = FirebaseDatabase::new(
        ClientBuilder::new(Client::new()).build(),
        "https://demo.firebaseio.com/",
        None,
    );

    assert_eq!(db.root().to_string(), "https://demo.firebaseio.com/");
    assert_eq!(
        db.reference("/dinosaurs//stegosaurus/").to_string(),
        "https://demo.firebaseio.com/dinosaurs/stegosaurus"
    );
    assert_eq!(db.reference("dinosaurs").key(), Some("dinosaurs"));
    assert_eq!(db.root().key(), None);
    assert!(db.root().parent().is_none());
}

#[test]
fn test_child_does_not_mutate_receiver() {
    let db = FirebaseDatabase::new(ClientBuilder::new(Client::new()).build(), "https://demo.firebaseio.com", None);
    let r = db.reference("dinosaurs");
    let before = r.to_string();

    let child = r.child("x");

    assert_eq!(r.to_string(), before);
    assert_eq!(child.path(), "dinosaurs/x");
    assert_eq!(child.parent().unwrap().key(), r.key());
    assert_eq!(r.child("a/../b").path(), "dinosaurs/b");
    assert_eq!(r.child("x").root().path(), "");
}

#[test]
fn test_query_modifiers_do_not_mutate_receiver() {
    let db = FirebaseDatabase::new(ClientBuilder::new(Client::new()).build(), "https://demo.firebaseio.com", None);
    let r = db.reference("dinosaurs");
    let q = r.order_by_child("height").limit_to_first(2);

    assert!(r.query().is_empty());
    assert!(!q.query().is_empty());
    assert_eq!(q.to_string(), r.to_string());
}

#[test]
fn test_is_equal() {
    let db = FirebaseDatabase::new(ClientBuilder::new(Client::new()).build(), "https://demo.firebaseio.com", None);
    let r = db.reference("dinosaurs");

    assert!(r
        .order_by_child("height")
        .equal_to(0.6)
        .is_equal(&r.order_by_child("height").equal_to(0.6)));
    assert!(!r
        .order_by_child("height")
        .equal_to(0.6)
        .is_equal(&r.order_by_child("height").equal_to(0.7)));
    assert!(!r
        .order_by_child("height")
        .equal_to(0.6)
        .is_equal(&r.order_by_child("length").equal_to(0.6)));
    assert!(!r.is_equal(&r.limit_to_last(1)));
    assert!(!r.is_equal(&r.child("x")));
    assert!(r.is_equal(&db.clone().reference("/dinosaurs/")));

    let other = FirebaseDatabase::new(ClientBuilder::new(Client::new()).build(), "https://demo.firebaseio.com", None);
    assert!(!r.is_equal(&other.reference("dinosaurs")));
}

#[tokio::test]
async fn test_snapshot_existence_lifecycle() {
    let server = MockServer::start();
    let db = database_for(&server);
    let r = db.reference("dinosaurs/stegosaurus");

    let mut read = server.mock(|when, then| {
        when.method(GET).path("/dinosaurs/stegosaurus.json");
        then.status(200).body("null");
    });
    let snapshot = r.once_value().await.unwrap();
    assert!(!snapshot.exists());
    assert_eq!(snapshot.key(), Some("stegosaurus"));
    read.delete();

    let write = server.mock(|when, then| {
        when.method(PUT)
            .path("/dinosaurs/stegosaurus.json")
            .header("content-type", "application/json")
            .json_body(json!({ "height": 4.0, "length": 9.0, "order": "ornithischia" }));
        then.status(200).json_body(json!({ "height": 4.0, "length": 9.0, "order": "ornithischia" }));
    });
    r.set(&stegosaurus()).await.unwrap();
    write.assert();

    read = server.mock(|when, then| {
        when.method(GET).path("/dinosaurs/stegosaurus.json");
        then.status(200)
            .json_body(json!({ "height": 4.0, "length": 9.0, "order": "ornithischia" }));
    });
    let snapshot = r.once_value().await.unwrap();
    assert!(snapshot.exists());
    assert_eq!(snapshot.val::<Dinosaur>().unwrap(), stegosaurus());
    read.delete();

    let delete = server.mock(|when, then| {
        when.method(DELETE).path("/dinosaurs/stegosaurus.json");
        then.status(200).body("null");
    });
    r.remove().await.unwrap();
    delete.assert();

    server.mock(|when, then| {
        when.method(GET).path("/dinosaurs/stegosaurus.json");
        then.status(200).body("null");
    });
    assert!(!r.once_value().await.unwrap().exists());
}

#[tokio::test]
async fn test_push_returns_new_child() {
    let server = MockServer::start();
    let db = database_for(&server);
    let r = db.reference("dinosaurs");

    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/dinosaurs.json")
            .json_body(json!({ "height": 4.0, "length": 9.0, "order": "ornithischia" }));
        then.status(200).json_body(json!({ "name": "-KqYbWx1uTHAVCj3Vxgo" }));
    });

    let pushed = r.push(&stegosaurus()).await.unwrap();
    mock.assert();

    assert_eq!(pushed.key(), Some("-KqYbWx1uTHAVCj3Vxgo"));
    assert_ne!(pushed.key(), r.key());
    assert_eq!(pushed.path(), "dinosaurs/-KqYbWx1uTHAVCj3Vxgo");
}

#[tokio::test]
async fn test_query_parameters_are_json_encoded() {
    let server = MockServer::start();
    let db = database_for(&server);

    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/dinosaurs.json")
            .query_param("orderBy", "\"height\"")
            .query_param("startAt", "3")
            .query_param("endAt", "\"z\"")
            .query_param("limitToFirst", "2");
        then.status(200).json_body(json!({
            "stegosaurus": { "height": 4.0, "length": 9.0, "order": "ornithischia" }
        }));
    });

    let snapshot = db
        .reference("dinosaurs")
        .order_by_child("height")
        .start_at(3)
        .end_at("z")
        .limit_to_first(2)
        .once_value()
        .await
        .unwrap();

    mock.assert();
    let dinosaurs: HashMap<String, Dinosaur> = snapshot.val().unwrap();
    assert_eq!(dinosaurs["stegosaurus"], stegosaurus());
}

#[tokio::test]
async fn test_root_url() {
    let server = MockServer::start();
    let db = database_for(&server);

    let mock = server.mock(|when, then| {
        when.method(GET).path("/.json");
        then.status(200).json_body(json!({ "a": 1 }));
    });

    let snapshot = db.root().once_value().await.unwrap();
    mock.assert();
    assert_eq!(snapshot.key(), None);
    assert_eq!(snapshot.bytes(), br#"{"a":1}"#);
}

#[tokio::test]
async fn test_reserved_characters_in_keys_are_encoded() {
    let server = MockServer::start();
    let db = database_for(&server);

    let truncated = server.mock(|when, then| {
        when.path("/faq/why");
        then.status(200).body("null");
    });
    let write = server.mock(|when, then| {
        when.method(PUT).path("/faq/why%3F.json").json_body(json!(1));
        then.status(200).json_body(json!(1));
    });
    let read = server.mock(|when, then| {
        when.method(GET).path("/discounts/50%25.json");
        then.status(200).json_body(json!("half off"));
    });

    db.reference("faq/why?").set(&1).await.unwrap();
    write.assert();
    assert_eq!(truncated.hits(), 0);

    let snapshot = db.reference("discounts").child("50%").once_value().await.unwrap();
    read.assert();
    assert_eq!(snapshot.key(), Some("50%"));
    assert_eq!(snapshot.val::<String>().unwrap(), "half off");
}

#[tokio::test]
async fn test_access_token_appended() {
    let server = MockServer::start();
    let db = FirebaseDatabase::new(
        ClientBuilder::new(Client::new()).build(),
        &server.base_url(),
        Some(Arc::new(StaticToken("token-abc"))),
    );

    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/scores.json")
            .query_param("orderBy", "\"$value\"")
            .query_param("access_token", "token-abc");
        then.status(200).body("{}");
    });

    db.reference("scores").order_by_value().once_value().await.unwrap();
    mock.assert();
}

#[tokio::test]
async fn test_token_failure_is_reported() {
    let server = MockServer::start();
    let db = FirebaseDatabase::new(
        ClientBuilder::new(Client::new()).build(),
        &server.base_url(),
        Some(Arc::new(FailingToken)),
    );

    let result = db.reference("scores").once_value().await;
    assert!(matches!(result, Err(DatabaseError::TokenError(_))));
}

#[tokio::test]
async fn test_update_sends_patch() {
    let server = MockServer::start();
    let db = database_for(&server);

    let mock = server.mock(|when, then| {
        when.method(PATCH)
            .path("/dinosaurs.json")
            .json_body(json!({ "stegosaurus/height": 5.0, "lastChanged": { ".sv": "timestamp" } }));
        then.status(200).body("{}");
    });

    db.reference("dinosaurs")
        .update(&json!({ "stegosaurus/height": 5.0, "lastChanged": ServerValue::timestamp() }))
        .await
        .unwrap();
    mock.assert();
}

#[tokio::test]
async fn test_is_null_uses_shallow_read() {
    let server = MockServer::start();
    let db = database_for(&server);

    server.mock(|when, then| {
        when.method(GET).path("/empty.json").query_param("shallow", "true");
        then.status(200).body("null");
    });
    server.mock(|when, then| {
        when.method(GET).path("/full.json").query_param("shallow", "true");
        then.status(200).json_body(json!({ "a": true }));
    });

    assert!(db.reference("empty").is_null().await.unwrap());
    assert!(!db.reference("full").is_null().await.unwrap());
}

#[tokio::test]
async fn test_server_error_message_surfaced() {
    let server = MockServer::start();
    let db = database_for(&server);

    server.mock(|when, then| {
        when.method(PUT).path("/locked.json");
        then.status(401).json_body(json!({ "error": "Permission denied" }));
    });

    match db.reference("locked").set(&json!(1)).await {
        Err(DatabaseError::ApiError { status, message }) => {
            assert_eq!(status, 401);
            assert_eq!(message, "Permission denied");
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test]
async fn test_status_line_when_body_empty() {
    let server = MockServer::start();
    let db = database_for(&server);

    server.mock(|when, then| {
        when.method(GET).path("/flaky.json");
        then.status(503);
    });

    let err = db.reference("flaky").once_value().await.unwrap_err();
    assert!(err.is_retryable());
    assert!(err.to_string().contains("503"));
}

#[tokio::test]
async fn test_val_type_mismatch_propagates() {
    let server = MockServer::start();
    let db = database_for(&server);

    server.mock(|when, then| {
        when.method(GET).path("/count.json");
        then.status(200).body("\"not a number\"");
    });

    let snapshot = db.reference("count").once_value().await.unwrap();
    assert!(snapshot.exists());
    assert!(snapshot.val::<i64>().is_err());
}

#[tokio::test]
async fn test_streaming_is_not_implemented() {
    let server = MockServer::start();
    let db = database_for(&server);
    let r = db.reference("dinosaurs");

    assert!(matches!(r.on_value(), Err(DatabaseError::NotImplemented("on_value"))));
    assert!(matches!(r.on_child_added(), Err(DatabaseError::NotImplemented(_))));
    assert!(matches!(r.on_child_changed(), Err(DatabaseError::NotImplemented(_))));
    assert!(matches!(r.on_child_moved(), Err(DatabaseError::NotImplemented(_))));
    assert!(matches!(r.on_child_removed(), Err(DatabaseError::NotImplemented(_))));
    assert!(matches!(r.once_child_added().await, Err(DatabaseError::NotImplemented(_))));
    assert!(matches!(r.once_child_removed().await, Err(DatabaseError::NotImplemented(_))));
    assert!(matches!(db.go_online(), Err(DatabaseError::NotImplemented("go_online"))));
    assert!(matches!(db.go_offline(), Err(DatabaseError::NotImplemented(_))));
}
