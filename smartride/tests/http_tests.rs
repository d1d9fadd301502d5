use smartride::prelude::*;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_latest_tag_is_first_listed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tags"))
        .and(header("user-agent", "smartride-tests"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"name": "v1.4.0"},
            {"name": "v1.3.2"}
        ])))
        .mount(&server)
        .await;

    let checker = VersionChecker::new(format!("{}/tags", server.uri()), Some("smartride-tests")).unwrap();
    assert_eq!(checker.latest_tag().await.as_deref(), Some("v1.4.0"));
    assert_eq!(
        checker.check(Some("v1.3.2".into())).await,
        UpdateStatus::Available {
            current: "v1.3.2".into(),
            latest: "v1.4.0".into()
        }
    );
}

#[tokio::test]
async fn test_tag_lookup_failures_are_unknown() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/empty"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let empty = VersionChecker::new(format!("{}/empty", server.uri()), None).unwrap();
    assert_eq!(empty.latest_tag().await, None);

    let broken = VersionChecker::new(format!("{}/broken", server.uri()), None).unwrap();
    assert_eq!(broken.check(Some("v1.0".into())).await, UpdateStatus::Unknown);
}

#[tokio::test]
async fn test_webhook_posts_embeds() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let webhook = DiscordWebhook::new(format!("{}/hook", server.uri()), None).unwrap();
    let service = NotificationService::new(Box::new(webhook), vec!["7".into()], "footer");
    let manager = NotificationManager::new(service);

    manager
        .send(Notification::new(NotificationKind::NoRoundTripDeparture))
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["content"], "<@7>");
    assert_eq!(body["embeds"][0]["footer"]["text"], "footer");
    assert!(body["embeds"][0]["timestamp"].is_string());
}

#[tokio::test]
async fn test_webhook_rejection_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad embed"))
        .mount(&server)
        .await;

    let webhook = DiscordWebhook::new(server.uri(), None).unwrap();
    let service = NotificationService::new(Box::new(webhook), vec![], "footer");

    let result = service
        .send("title", "description", None, &[], None, false)
        .await;
    match result {
        Err(NotifyError::Rejected { status, body }) => {
            assert_eq!(status, 400);
            assert_eq!(body, "bad embed");
        }
        other => panic!("expected rejection, got {:?}", other),
    }
}

#[test]
fn test_webhook_requires_http_url() {
    assert!(matches!(
        DiscordWebhook::new("discord.com/api/webhooks/1", None),
        Err(NotifyError::InvalidConfig { .. })
    ));
}
