use intake_server::{AppConfig, build_app};
use reqwest::StatusCode;
use serde_json::{Value, json};
use tokio::task::JoinHandle;

async fn start_server() -> (String, tokio::sync::oneshot::Sender<()>, JoinHandle<()>) {
    let app = build_app(&AppConfig::default()).await.expect("build app");

    // Bind to an ephemeral port
    let listener = tokio::net::TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0))
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();

    let server = tokio::spawn(async move {
        let _ = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = rx.await;
            })
            .await;
    });

    (format!("http://{addr}"), tx, server)
}

async fn post(client: &reqwest::Client, url: String, body: Value) -> (StatusCode, Value) {
    let resp = client.post(url).json(&body).send().await.unwrap();
    let status = resp.status();
    let body: Value = resp.json().await.unwrap();
    (status, body)
}

async fn get(client: &reqwest::Client, url: String) -> (StatusCode, Value) {
    let resp = client.get(url).send().await.unwrap();
    let status = resp.status();
    let body: Value = resp.json().await.unwrap();
    (status, body)
}

fn initial_tree() -> Value {
    json!({
        "application": { "address": "1 Main St", "city": "Springfield", "numberOfBedrooms": 2 },
        "members": [{ "id": "a", "local": true, "first": "Jo" }],
        "vehicles": [{ "id": "v1", "local": true, "ownerId": "a", "make": "Ford" }]
    })
}

#[tokio::test]
async fn submit_new_tree_and_read_it_back() {
    let (base, shutdown_tx, handle) = start_server().await;
    let client = reqwest::Client::new();

    let (status, body) = post(&client, format!("{base}/application"), initial_tree()).await;
    assert_eq!(status, StatusCode::OK);

    let app_id = body["application"]["id"].as_i64().unwrap();
    assert!(app_id > 0);
    assert_eq!(body["application"]["address"], "1 Main St");
    assert_eq!(body["application"]["numberOfBedrooms"], 2);
    assert!(body["application"].get("members").is_none());

    let members = body["members"].as_array().unwrap();
    assert_eq!(members.len(), 1);
    let member_id = members[0]["id"].as_i64().unwrap();
    assert!(member_id > 0);
    assert_eq!(members[0]["first"], "Jo");
    assert_eq!(members[0]["application_id"], app_id);

    let vehicles = body["vehicles"].as_array().unwrap();
    assert_eq!(vehicles.len(), 1);
    assert!(vehicles[0]["id"].as_i64().unwrap() > 0);
    assert_eq!(vehicles[0]["ownerId"], member_id);
    assert_eq!(vehicles[0]["make"], "Ford");
    // Markers never reach storage
    assert!(vehicles[0].get("local").is_none());

    // Nested form on the read side
    let (status, tree) = get(&client, format!("{base}/application/{app_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tree["id"], app_id);
    assert_eq!(tree["city"], "Springfield");
    assert_eq!(tree["members"][0]["id"], member_id);
    assert_eq!(tree["vehicles"][0]["ownerId"], member_id);

    let (status, all) = get(&client, format!("{base}/application")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(all.as_array().unwrap().len(), 1);
    assert_eq!(all[0]["id"], app_id);

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn resubmission_with_removal_empties_dependents() {
    let (base, shutdown_tx, handle) = start_server().await;
    let client = reqwest::Client::new();

    let (_, created) = post(&client, format!("{base}/application"), initial_tree()).await;
    let app_id = created["application"]["id"].as_i64().unwrap();
    let member_id = created["members"][0]["id"].clone();
    let vehicle_id = created["vehicles"][0]["id"].clone();

    let revision = json!({
        "application": created["application"].clone(),
        "members": [{ "id": member_id, "removed": true }],
        "vehicles": [{ "id": vehicle_id, "removed": true }]
    });
    let (status, body) = post(&client, format!("{base}/application/{app_id}"), revision).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["application"]["id"], app_id);
    assert_eq!(body["application"]["address"], "1 Main St");
    assert_eq!(body["members"], json!([]));
    assert_eq!(body["vehicles"], json!([]));

    // Deleted ids cannot be revived
    let stale = json!({ "members": [{ "id": member_id, "first": "Jo" }] });
    let (status, body) = post(&client, format!("{base}/application/{app_id}"), stale).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn sparse_revision_keeps_unsent_attributes() {
    let (base, shutdown_tx, handle) = start_server().await;
    let client = reqwest::Client::new();

    let tree = json!({
        "application": { "address": "1 Main St", "city": "Springfield", "phoneNumber": "5550100" },
        "members": [{ "id": "a", "local": true, "first": "Jo", "age": 40, "email": "jo@example.com" }],
        "vehicles": [
            { "id": "v1", "local": true, "ownerId": "a", "make": "Toyota", "year": 2009 },
            { "id": "v2", "local": true, "ownerId": "a", "make": "Kia" }
        ]
    });
    let (_, created) = post(&client, format!("{base}/application"), tree).await;
    let app_id = created["application"]["id"].as_i64().unwrap();
    let member_id = created["members"][0]["id"].clone();
    let kept = created["vehicles"][0]["id"].clone();
    let removed = created["vehicles"][1]["id"].clone();

    // No application section, sparse member and vehicle, one removal
    let revision = json!({
        "members": [{ "id": member_id, "first": "Joanna" }],
        "vehicles": [
            { "id": kept, "ownerId": member_id, "make": "Ford" },
            { "id": removed, "removed": true }
        ]
    });
    let (status, body) = post(&client, format!("{base}/application/{app_id}"), revision).await;
    assert_eq!(status, StatusCode::OK);

    let (_, tree) = get(&client, format!("{base}/application/{app_id}")).await;
    assert_eq!(tree["address"], "1 Main St");
    assert_eq!(tree["city"], "Springfield");
    assert_eq!(tree["phoneNumber"], "5550100");
    assert_eq!(tree["members"][0]["first"], "Joanna");
    assert_eq!(tree["members"][0]["age"], 40);
    assert_eq!(tree["members"][0]["email"], "jo@example.com");
    let vehicles = tree["vehicles"].as_array().unwrap();
    assert_eq!(vehicles.len(), 1);
    assert_eq!(vehicles[0]["make"], "Ford");
    assert_eq!(vehicles[0]["year"], 2009);
    assert_eq!(body["vehicles"], tree["vehicles"]);

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn update_only_resubmission_changes_nothing() {
    let (base, shutdown_tx, handle) = start_server().await;
    let client = reqwest::Client::new();

    let (_, created) = post(&client, format!("{base}/application"), initial_tree()).await;
    let app_id = created["application"]["id"].as_i64().unwrap();

    // The client sends back exactly what it received
    let (status, again) = post(
        &client,
        format!("{base}/application/{app_id}"),
        created.clone(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again["members"][0]["id"], created["members"][0]["id"]);
    assert_eq!(again["members"][0]["first"], created["members"][0]["first"]);
    assert_eq!(again["vehicles"][0]["id"], created["vehicles"][0]["id"]);
    assert_eq!(again["vehicles"][0]["ownerId"], created["vehicles"][0]["ownerId"]);
    assert_eq!(again["application"]["address"], created["application"]["address"]);

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn dangling_owner_is_rejected_and_nothing_changes() {
    let (base, shutdown_tx, handle) = start_server().await;
    let client = reqwest::Client::new();

    let (_, created) = post(&client, format!("{base}/application"), initial_tree()).await;
    let app_id = created["application"]["id"].as_i64().unwrap();
    let member_id = created["members"][0]["id"].clone();
    let vehicle_id = created["vehicles"][0]["id"].clone();

    // Removing the owner while keeping its vehicle
    let revision = json!({
        "application": { "address": "2 Oak Ave" },
        "members": [{ "id": member_id, "removed": true }],
        "vehicles": [{ "id": vehicle_id, "ownerId": member_id, "make": "Ford" }]
    });
    let (status, body) = post(&client, format!("{base}/application/{app_id}"), revision).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "unprocessable_entity");

    let (_, tree) = get(&client, format!("{base}/application/{app_id}")).await;
    assert_eq!(tree["address"], "1 Main St");
    assert_eq!(tree["members"].as_array().unwrap().len(), 1);
    assert_eq!(tree["vehicles"].as_array().unwrap().len(), 1);

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn malformed_submissions_are_bad_requests() {
    let (base, shutdown_tx, handle) = start_server().await;
    let client = reqwest::Client::new();

    let (_, created) = post(&client, format!("{base}/application"), initial_tree()).await;
    let app_id = created["application"]["id"].as_i64().unwrap();

    let cases = [
        json!({ "members": [{ "id": "x", "local": true, "removed": true }] }),
        json!({ "members": [{ "first": "No id" }] }),
        json!({ "vehicles": [{ "id": "v2", "local": true }] }),
        json!({ "application": { "id": app_id + 1 } }),
        json!({ "vehicles": [
            { "id": "v2", "local": true, "ownerId": "a" },
            { "id": "v2", "local": true, "ownerId": "a" }
        ] }),
    ];
    for body in cases {
        let (status, err) = post(&client, format!("{base}/application/{app_id}"), body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(err["code"], "bad_request");
        assert!(err["message"].as_str().is_some());
    }

    // Not JSON at all
    let resp = client
        .post(format!("{base}/application"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // Wrong content type
    let resp = client
        .post(format!("{base}/application"))
        .header("content-type", "text/plain")
        .body("{}")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn unknown_application_is_not_found() {
    let (base, shutdown_tx, handle) = start_server().await;
    let client = reqwest::Client::new();

    let (status, body) = get(&client, format!("{base}/application/999")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");

    let (status, _) = get(&client, format!("{base}/application/abc")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = post(&client, format!("{base}/application/999"), json!({})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, all) = get(&client, format!("{base}/application")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(all, json!([]));

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}
