use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::adapters::{
    is_url_verification, AppsScriptImageRelay, GoogleDocsStore, GoogleSheetsJobRecords,
    SlackChallengeResponse, SlackClient, SlackEventWrapper,
};
use crate::dispatcher::{DispatcherSettings, EventDispatcher};
use crate::google_auth::GoogleAuth;
use crate::thread_registry::ThreadRegistry;

use super::config::ServiceConfig;
use super::state::AppState;
use super::verify::verify_slack;
use super::BoxError;

pub async fn run_server(
    config: ServiceConfig,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<(), BoxError> {
    let dispatcher = build_dispatcher(&config).await?;
    let state = AppState::new(dispatcher, config.slack_signing_secret.clone());

    let host: IpAddr = config
        .host
        .parse()
        .map_err(|_| format!("invalid host: {}", config.host))?;
    let addr = SocketAddr::new(host, config.port);
    info!("job log service listening on {}", addr);

    let app = build_router(state, config.max_body_bytes);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    info!("job log service stopped");
    Ok(())
}

/// Wire the HTTP adapters into a dispatcher with an empty thread registry.
pub async fn build_dispatcher(config: &ServiceConfig) -> Result<Arc<EventDispatcher>, BoxError> {
    let http = reqwest::Client::builder()
        .timeout(config.http_timeout)
        .build()?;
    let auth = Arc::new(GoogleAuth::new(config.google_auth.clone(), http.clone())?);

    let slack = SlackClient::with_base_url(
        http.clone(),
        config.slack_bot_token.clone(),
        config.slack_api_base_url.clone(),
    );
    let (bot_user_id, bot_id) = match slack.auth_test().await {
        Ok(identity) => {
            info!(
                "Slack bot identity user_id={:?} bot_id={:?}",
                identity.user_id, identity.bot_id
            );
            (
                config.slack_bot_user_id.clone().or(identity.user_id),
                identity.bot_id,
            )
        }
        Err(err) => {
            warn!("auth.test failed, own-message filtering uses SLACK_BOT_USER_ID only: {}", err);
            (config.slack_bot_user_id.clone(), None)
        }
    };

    let records = GoogleSheetsJobRecords::new(
        http.clone(),
        auth.clone(),
        config.google_endpoints.sheets.clone(),
        config.google_sheet_id.clone(),
        config.google_worksheet_name.clone(),
    );
    let documents = GoogleDocsStore::new(http.clone(), auth, config.google_endpoints.clone())
        .with_folder(config.google_drive_folder_id.clone());
    let relay = AppsScriptImageRelay::new(
        http,
        config.gas_webhook_url.clone(),
        config.image_relay_token.clone(),
    );

    let settings = DispatcherSettings {
        bot_user_id,
        bot_id,
        history_limit: config.channel_history_limit,
        utc_offset: config.transcript_offset,
    };
    Ok(Arc::new(EventDispatcher::new(
        Arc::new(ThreadRegistry::new()),
        Arc::new(slack),
        Arc::new(records),
        Arc::new(documents),
        Arc::new(relay),
        settings,
    )))
}

pub fn build_router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/slack/events", post(slack_events))
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_body_bytes))
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn slack_events(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    if let Some(verification) = is_url_verification(&body) {
        let response = SlackChallengeResponse {
            challenge: verification.challenge,
        };
        return (StatusCode::OK, Json(json!(response)));
    }

    if let Err(reason) = verify_slack(state.signing_secret.as_deref(), &headers, &body) {
        warn!("rejected Slack request: {}", reason);
        return (StatusCode::UNAUTHORIZED, Json(json!({"status": reason})));
    }

    // The first delivery was already accepted and is being handled.
    if let Some(retry) = headers
        .get("x-slack-retry-num")
        .and_then(|value| value.to_str().ok())
    {
        let reason = headers
            .get("x-slack-retry-reason")
            .and_then(|value| value.to_str().ok())
            .unwrap_or("unknown");
        info!("acknowledging Slack retry {} ({})", retry, reason);
        return (StatusCode::OK, Json(json!({"status": "retry_ignored"})));
    }

    let wrapper: SlackEventWrapper = match serde_json::from_slice(&body) {
        Ok(wrapper) => wrapper,
        Err(err) => {
            warn!("failed to parse Slack payload: {}", err);
            return (StatusCode::BAD_REQUEST, Json(json!({"status": "bad_json"})));
        }
    };
    let event_id = wrapper.event_id.clone().unwrap_or_default();
    let Some(event) = wrapper.into_inbound_event() else {
        debug!("ignoring Slack callback {}", event_id);
        return (StatusCode::OK, Json(json!({"status": "ignored"})));
    };

    let dispatcher = state.dispatcher.clone();
    let task = tokio::spawn(async move { dispatcher.handle(event).await });
    tokio::spawn(async move {
        match task.await {
            Ok(outcome) => debug!("event {} handled: {:?}", event_id, outcome),
            Err(err) => error!("event {} task failed: {}", event_id, err),
        }
    });

    (StatusCode::OK, Json(json!({"status": "accepted"})))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{HeaderValue, Request};
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::service::verify::{sign, unix_now};
    use crate::testing::{FakeChat, FakeDocs, FakeRecords, FakeRelay, Harness};

    const SECRET: &str = "s3cret";

    fn harness() -> Harness {
        Harness::new(
            FakeChat::default().with_user("U1", Some("Alice"), None),
            FakeRecords::with_jobs(&["12345"]),
            FakeDocs::default().with_document("12345", "doc-1"),
            FakeRelay::default(),
        )
    }

    fn router(harness: &Harness, secret: Option<&str>) -> Router {
        let state = AppState::new(harness.dispatcher.clone(), secret.map(str::to_string));
        build_router(state, 64 * 1024)
    }

    fn signed_request(body: &str) -> Request<Body> {
        let timestamp = unix_now().to_string();
        let signature = sign(SECRET, &timestamp, body.as_bytes()).expect("sign");
        Request::builder()
            .method("POST")
            .uri("/slack/events")
            .header("content-type", "application/json")
            .header("x-slack-request-timestamp", timestamp)
            .header("x-slack-signature", signature)
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        serde_json::from_slice(&bytes).expect("json")
    }

    fn tagged_message() -> String {
        json!({
            "type": "event_callback",
            "event_id": "Ev1",
            "event": {
                "type": "message",
                "channel": "C1",
                "user": "U1",
                "text": "starting #12345!",
                "ts": "1704099600.000100"
            }
        })
        .to_string()
    }

    #[tokio::test]
    async fn health_is_ok() {
        let harness = harness();
        let response = router(&harness, None)
            .oneshot(Request::get("/health").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn echoes_url_verification_challenge() {
        let harness = harness();
        let body = r#"{"type":"url_verification","challenge":"3eZbrw1aBm2rZgRNFdxV2595E9CY3gmdALWMmHkvFXO7tYXAYM8P","token":"x"}"#;
        let request = Request::post("/slack/events")
            .body(Body::from(body))
            .expect("request");
        let response = router(&harness, Some(SECRET))
            .oneshot(request)
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await["challenge"],
            "3eZbrw1aBm2rZgRNFdxV2595E9CY3gmdALWMmHkvFXO7tYXAYM8P"
        );
    }

    #[tokio::test]
    async fn rejects_bad_signature() {
        let harness = harness();
        let mut request = signed_request(&tagged_message());
        request
            .headers_mut()
            .insert("x-slack-signature", HeaderValue::from_static("v0=deadbeef"));
        let response = router(&harness, Some(SECRET))
            .oneshot(request)
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(harness.chat.replies().is_empty());
    }

    #[tokio::test]
    async fn dispatches_signed_message_event() {
        let harness = harness();
        let response = router(&harness, Some(SECRET))
            .oneshot(signed_request(&tagged_message()))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "accepted");

        for _ in 0..100 {
            if !harness.chat.replies().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let replies = harness.chat.replies();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].text, ":white_check_mark: Got it! Logging to job #12345.");
        assert!(harness.registry.is_tracked("1704099600.000100"));
    }

    #[tokio::test]
    async fn acknowledges_retries_without_dispatch() {
        let harness = harness();
        let mut request = signed_request(&tagged_message());
        request
            .headers_mut()
            .insert("x-slack-retry-num", HeaderValue::from_static("1"));
        request
            .headers_mut()
            .insert("x-slack-retry-reason", HeaderValue::from_static("http_timeout"));
        let response = router(&harness, Some(SECRET))
            .oneshot(request)
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "retry_ignored");

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(harness.records.lookups(), 0);
        assert!(harness.registry.is_empty());
    }

    #[tokio::test]
    async fn malformed_and_unhandled_payloads() {
        let harness = harness();
        let app = router(&harness, None);

        let response = app
            .clone()
            .oneshot(Request::post("/slack/events").body(Body::from("not json")).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let reaction = json!({
            "type": "event_callback",
            "event": {"type": "reaction_added", "user": "U1"}
        })
        .to_string();
        let response = app
            .oneshot(Request::post("/slack/events").body(Body::from(reaction)).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "ignored");
    }
}
