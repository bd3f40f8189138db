use ong_session::{fetch_remote_settings, SettingsClient};
use ong_types::{AvatarSettings, DEFAULT_INSTRUCTIONS};
use std::time::{Duration, Instant};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn server_responding(template: ResponseTemplate) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/avatar/settings"))
        .respond_with(template)
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn full_response_is_used_as_is() {
    let server = server_responding(ResponseTemplate::new(200).set_body_json(serde_json::json!({
        "voice": "Kore",
        "prompt": "You are a patient language tutor."
    })))
    .await;

    let settings = fetch_remote_settings(&server.uri(), Duration::from_secs(5)).await;
    assert_eq!(settings.voice, "Kore");
    assert_eq!(settings.prompt, "You are a patient language tutor.");
}

#[tokio::test]
async fn partial_response_fills_missing_fields() {
    let server =
        server_responding(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "voice": "X"
        })))
        .await;

    let settings = fetch_remote_settings(&server.uri(), Duration::from_secs(5)).await;
    assert_eq!(settings.voice, "X");
    assert_eq!(settings.prompt, DEFAULT_INSTRUCTIONS);
}

#[tokio::test]
async fn server_error_yields_defaults() {
    let server = server_responding(ResponseTemplate::new(500)).await;
    let settings = fetch_remote_settings(&server.uri(), Duration::from_secs(5)).await;
    assert_eq!(settings, AvatarSettings::default());
}

#[tokio::test]
async fn non_ok_success_status_yields_defaults() {
    let server = server_responding(
        ResponseTemplate::new(204).set_body_json(serde_json::json!({"voice": "Puck"})),
    )
    .await;
    let settings = fetch_remote_settings(&server.uri(), Duration::from_secs(5)).await;
    assert_eq!(settings, AvatarSettings::default());
}

#[tokio::test]
async fn malformed_body_yields_defaults() {
    let server = server_responding(ResponseTemplate::new(200).set_body_string("<html>")).await;
    let settings = fetch_remote_settings(&server.uri(), Duration::from_secs(5)).await;
    assert_eq!(settings, AvatarSettings::default());
}

#[tokio::test]
async fn connection_refused_yields_defaults() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let settings = fetch_remote_settings(&format!("http://{}", addr), Duration::from_secs(5)).await;
    assert_eq!(settings, AvatarSettings::default());
}

#[tokio::test]
async fn slow_server_is_cut_off_at_timeout() {
    let server = server_responding(
        ResponseTemplate::new(200)
            .set_body_json(serde_json::json!({"voice": "Puck"}))
            .set_delay(Duration::from_secs(5)),
    )
    .await;

    let client = SettingsClient::new(&server.uri(), Duration::from_millis(200));
    let started = Instant::now();
    let settings = client.fetch().await;

    assert_eq!(settings, AvatarSettings::default());
    assert!(
        started.elapsed() < Duration::from_secs(2),
        "fetch should give up near the timeout, took {:?}",
        started.elapsed()
    );
}

#[tokio::test]
async fn every_failure_mode_produces_identical_output() {
    let failing = server_responding(ResponseTemplate::new(500)).await;
    let from_500 = fetch_remote_settings(&failing.uri(), Duration::from_secs(5)).await;
    let from_refused = fetch_remote_settings("http://127.0.0.1:1", Duration::from_secs(5)).await;
    assert_eq!(from_500, from_refused);
}
