use reqwest::StatusCode;
use serde_json::{json, Value};
use wiremock::{
    matchers::{any, method, path},
    Mock, ResponseTemplate,
};

use waitlist::domain::iso8601;

use crate::helpers::App;

async fn mount_successful_relay(app: &App, expected_calls: u64) {
    Mock::given(path("/exec"))
        .and(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .expect(expected_calls)
        .mount(&app.relay_server)
        .await;
}

#[tokio::test]
async fn waitlist_returns_200_and_stores_normalized_email() {
    let app = App::new().await;
    mount_successful_relay(&app, 1).await;

    let response = app.post_waitlist(&json!({"email": " Jane@Example.COM "})).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.json::<Value>().await.unwrap(),
        json!({"success": true})
    );

    let saved = app.saved_entries().await;
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].email, "jane@example.com");
}

#[tokio::test]
async fn waitlist_relays_the_stored_entry() {
    let app = App::new().await;
    mount_successful_relay(&app, 1).await;

    app.post_waitlist(&json!({"email": "jane@example.com"}))
        .await
        .error_for_status()
        .unwrap();

    let saved = app.saved_entries().await;
    let relay_request = &app.relay_server.received_requests().await.unwrap()[0];
    let body: Value = serde_json::from_slice(&relay_request.body).unwrap();

    assert_eq!(
        body,
        json!({
            "email": "jane@example.com",
            "timestamp": iso8601::format(&saved[0].subscribed_at),
        })
    );
}

#[tokio::test]
async fn waitlist_returns_400_when_email_is_missing() {
    let app = App::new().await;
    mount_successful_relay(&app, 0).await;

    let test_cases = [
        (json!({"email": ""}), "empty email"),
        (json!({"email": "   "}), "blank email"),
        (json!({"email": null}), "null email"),
        (json!({}), "no email field"),
        (json!({"name": "Jane"}), "unrelated fields only"),
        (json!(["jane@example.com"]), "body is not an object"),
    ];

    for (body, description) in test_cases {
        let response = app.post_waitlist(&body).await;

        assert_eq!(
            response.status(),
            StatusCode::BAD_REQUEST,
            "The API did not fail with 400 Bad Request when the payload had {}.",
            description
        );
        assert_eq!(
            response.json::<Value>().await.unwrap(),
            json!({"success": false, "error": "Email is required."}),
            "Unexpected body when the payload had {}.",
            description
        );
    }

    assert!(app.saved_entries().await.is_empty());
}

#[tokio::test]
async fn waitlist_returns_400_for_invalid_email() {
    let app = App::new().await;
    mount_successful_relay(&app, 0).await;

    let test_cases = [
        json!({"email": "not-an-email"}),
        json!({"email": "jane@localhost"}),
        json!({"email": "@example.com"}),
        json!({"email": "jane doe@example.com"}),
        json!({"email": 12345}),
    ];

    for body in test_cases {
        let response = app.post_waitlist(&body).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.json::<Value>().await.unwrap(),
            json!({"success": false, "error": "Please enter a valid email address."}),
            "Unexpected body for payload {}",
            body
        );
    }

    assert!(app.saved_entries().await.is_empty());
}

#[tokio::test]
async fn waitlist_treats_unreadable_body_as_missing_email() {
    let app = App::new().await;
    mount_successful_relay(&app, 0).await;

    let malformed = app
        .client
        .post(format!("http://{}/api/waitlist", app.address))
        .header("Content-Type", "application/json")
        .body("{\"email\": ")
        .send()
        .await
        .expect("Failed to execute request");
    let without_body = app
        .client
        .post(format!("http://{}/api/waitlist", app.address))
        .send()
        .await
        .expect("Failed to execute request");

    for response in [malformed, without_body] {
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.json::<Value>().await.unwrap(),
            json!({"success": false, "error": "Email is required."})
        );
    }
}

#[tokio::test]
async fn waitlist_keeps_duplicates_in_submission_order() {
    let app = App::new().await;
    mount_successful_relay(&app, 3).await;

    for email in ["a@example.com", "b@example.com", "A@example.com"] {
        app.post_waitlist(&json!({ "email": email }))
            .await
            .error_for_status()
            .unwrap();
    }

    let emails: Vec<_> = app
        .saved_entries()
        .await
        .into_iter()
        .map(|entry| entry.email)
        .collect();
    assert_eq!(emails, ["a@example.com", "b@example.com", "a@example.com"]);
}

#[tokio::test]
async fn waitlist_succeeds_when_relay_fails() {
    let app = App::new().await;

    Mock::given(any())
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&app.relay_server)
        .await;

    let response = app.post_waitlist(&json!({"email": "jane@example.com"})).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.json::<Value>().await.unwrap(),
        json!({"success": true})
    );
    assert_eq!(app.saved_entries().await.len(), 1);
}

#[tokio::test]
async fn waitlist_succeeds_when_relay_reports_failure() {
    let app = App::new().await;

    Mock::given(any())
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"success": false, "error": "nope"})),
        )
        .expect(1)
        .mount(&app.relay_server)
        .await;

    let response = app.post_waitlist(&json!({"email": "jane@example.com"})).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.saved_entries().await.len(), 1);
}

#[tokio::test]
async fn waitlist_succeeds_when_relay_times_out() {
    let app = App::new().await;

    Mock::given(any())
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"success": true}))
                .set_delay(std::time::Duration::from_secs(5)),
        )
        .mount(&app.relay_server)
        .await;

    let response = app.post_waitlist(&json!({"email": "jane@example.com"})).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.saved_entries().await.len(), 1);
}

#[tokio::test]
async fn waitlist_succeeds_without_a_relay_target() {
    let app = App::spawn(|configuration, _| configuration.relay.url = None).await;
    mount_successful_relay(&app, 0).await;

    let response = app.post_waitlist(&json!({"email": "jane@example.com"})).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.saved_entries().await.len(), 1);
}

#[tokio::test]
async fn waitlist_returns_500_and_skips_relay_when_storage_fails() {
    // The data file path points at a directory, so reading it fails.
    let app = App::spawn(|configuration, data_dir| {
        configuration.storage.data_file = data_dir.to_path_buf();
    })
    .await;
    mount_successful_relay(&app, 0).await;

    let response = app.post_waitlist(&json!({"email": "jane@example.com"})).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        response.json::<Value>().await.unwrap(),
        json!({
            "success": false,
            "error": "Something went wrong. Please try again later.",
        })
    );
}
