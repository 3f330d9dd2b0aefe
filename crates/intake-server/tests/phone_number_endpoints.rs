use intake_server::{AppConfig, build_app};
use reqwest::StatusCode;
use serde_json::{Value, json};
use tokio::task::JoinHandle;

async fn start_server(cfg: AppConfig) -> (String, tokio::sync::oneshot::Sender<()>, JoinHandle<()>) {
    let app = build_app(&cfg).await.expect("build app");

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

#[tokio::test]
async fn validate_then_confirm() {
    let (base, shutdown_tx, handle) = start_server(AppConfig::default()).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/phone-number/validate"))
        .json(&json!({ "phoneNumber": "5551234" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    // No application yet: empty object
    let resp = client
        .post(format!("{base}/phone-number/confirm"))
        .json(&json!({ "phoneNumber": "5551234", "confirmationCode": "8585" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!({}));

    // Submit an application for the number, then confirm again
    let resp = client
        .post(format!("{base}/application"))
        .json(&json!({
            "application": { "phoneNumber": "5551234", "zip": "12345" },
            "members": [{ "id": "m", "local": true, "first": "Jo" }]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let created: Value = resp.json().await.unwrap();

    let resp = client
        .post(format!("{base}/phone-number/confirm"))
        .json(&json!({ "phoneNumber": "5551234", "confirmationCode": 8585 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["application"]["id"], created["application"]["id"]);
    assert_eq!(body["application"]["zip"], "12345");
    assert_eq!(body["members"][0]["first"], "Jo");
    assert_eq!(body["vehicles"], json!([]));

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn missing_and_incorrect_values_are_rejected() {
    let (base, shutdown_tx, handle) = start_server(AppConfig::default()).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/phone-number/validate"))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["message"], "Phone number must be included in request.");

    let resp = client
        .post(format!("{base}/phone-number/confirm"))
        .json(&json!({ "phoneNumber": "5551234" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(
        body["message"],
        "Phone number and confirmation code must be included in request."
    );

    let resp = client
        .post(format!("{base}/phone-number/confirm"))
        .json(&json!({ "phoneNumber": "5559999", "confirmationCode": 8585 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["message"], "Phone number or confirmation code is incorrect.");

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn configured_code_is_used() {
    let mut cfg = AppConfig::default();
    cfg.confirmation.default_code = 4242;
    let (base, shutdown_tx, handle) = start_server(cfg).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/phone-number/validate"))
        .json(&json!({ "phoneNumber": 5550001 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = client
        .post(format!("{base}/phone-number/confirm"))
        .json(&json!({ "phoneNumber": "5550001", "confirmationCode": 8585 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = client
        .post(format!("{base}/phone-number/confirm"))
        .json(&json!({ "phoneNumber": "5550001", "confirmationCode": 4242 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}
