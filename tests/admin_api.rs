use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use permaflush::catalog::Capabilities;
use permaflush::flush::{Flusher, RewriteError, RewriteRules};
use permaflush::hooks::{HookBus, bind_api_saves, bind_watched_events};
use permaflush::http::{HttpState, build_router};
use permaflush::settings::{SettingsService, SettingsStore, TomlSettingsStore};

struct CountingRules {
    calls: AtomicUsize,
}

impl CountingRules {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RewriteRules for CountingRules {
    async fn recompute(&self) -> Result<(), RewriteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct Harness {
    router: Router,
    rules: Arc<CountingRules>,
    _state_dir: tempfile::TempDir,
}

async fn harness(capabilities: Capabilities) -> Harness {
    let state_dir = tempfile::tempdir().expect("temp dir");
    let store: Arc<dyn SettingsStore> = Arc::new(TomlSettingsStore::new(
        state_dir.path().join("state.toml"),
    ));
    let (service, _period_rx) = SettingsService::connect(store, capabilities)
        .await
        .expect("connect settings service");
    let service = Arc::new(service);

    let rules = CountingRules::new();
    let flusher = Arc::new(Flusher::new(rules.clone()));

    let bus = Arc::new(HookBus::new());
    let settings = service.load().await.expect("load settings");
    bind_watched_events(
        &bus,
        &settings.watched_events,
        &service.catalog(),
        flusher.clone(),
    );
    bind_api_saves(&bus, &["post".to_string(), "page".to_string()], flusher.clone());

    Harness {
        router: build_router(HttpState {
            settings: service,
            bus,
            flusher,
        }),
        rules,
        _state_dir: state_dir,
    }
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("collect body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("json body")
}

#[tokio::test]
async fn healthz_answers_ok() {
    let harness = harness(Capabilities::default()).await;

    let response = harness
        .router
        .oneshot(
            Request::builder()
                .uri("/healthz")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn get_settings_returns_defaults_and_catalog() {
    let harness = harness(Capabilities::default()).await;

    let response = harness
        .router
        .oneshot(
            Request::builder()
                .uri("/admin/settings")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;

    assert_eq!(body["interval_minutes"], 5);
    let watched = body["watched_events"].as_array().expect("watched array");
    let actions = body["available_actions"].as_array().expect("actions array");
    // Defaults watch the full base catalog.
    assert_eq!(watched.len(), actions.len());
    assert_eq!(actions.len(), 14);
    assert!(watched.iter().any(|event| event == "post_saved"));
}

#[tokio::test]
async fn capabilities_extend_the_advertised_catalog() {
    let harness = harness(Capabilities {
        commerce: true,
        seo: true,
        custom_fields: false,
    })
    .await;

    let response = harness
        .router
        .oneshot(
            Request::builder()
                .uri("/admin/settings")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let body = json_body(response).await;
    let ids: Vec<&str> = body["available_actions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry["id"].as_str().unwrap())
        .collect();

    assert!(ids.contains(&"product_saved"));
    assert!(ids.contains(&"seo_meta_saved"));
    assert!(!ids.contains(&"field_group_saved"));
}

#[tokio::test]
async fn patch_settings_sanitizes_and_persists() {
    let harness = harness(Capabilities::default()).await;

    let patch = json!({
        "interval_minutes": 10,
        "watched_events": ["post_saved", "no_such_event", "menu_updated"],
    });
    let response = harness
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("PATCH")
                .uri("/admin/settings")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(patch.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["interval_minutes"], 10);
    assert_eq!(body["watched_events"], json!(["post_saved", "menu_updated"]));

    // Survives a fresh read.
    let response = harness
        .router
        .oneshot(
            Request::builder()
                .uri("/admin/settings")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["interval_minutes"], 10);
}

#[tokio::test]
async fn patch_with_out_of_range_interval_falls_back_to_default() {
    let harness = harness(Capabilities::default()).await;

    let patch = json!({ "interval_minutes": 0 });
    let response = harness
        .router
        .oneshot(
            Request::builder()
                .method("PATCH")
                .uri("/admin/settings")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(patch.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let body = json_body(response).await;
    assert_eq!(body["interval_minutes"], 5);
}

#[tokio::test]
async fn watched_hook_triggers_a_flush() {
    let harness = harness(Capabilities::default()).await;

    let response = harness
        .router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/hooks/post_saved")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = json_body(response).await;
    assert_eq!(body["hook"], "post_saved");
    assert_eq!(body["listeners"], 1);
    assert_eq!(body["flushed"], true);
    assert_eq!(harness.rules.calls(), 1);
}

#[tokio::test]
async fn unbound_hook_is_accepted_without_flushing() {
    let harness = harness(Capabilities::default()).await;

    let response = harness
        .router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/hooks/not_a_thing")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = json_body(response).await;
    assert_eq!(body["listeners"], 0);
    assert_eq!(body["flushed"], false);
    assert_eq!(harness.rules.calls(), 0);
}

#[tokio::test]
async fn deselecting_an_event_stops_its_flushes_without_restart() {
    let harness = harness(Capabilities::default()).await;

    let patch = json!({ "watched_events": [] });
    let response = harness
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("PATCH")
                .uri("/admin/settings")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(patch.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = harness
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/hooks/menu_updated")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = json_body(response).await;
    assert_eq!(body["listeners"], 0);
    assert_eq!(body["flushed"], false);
    assert_eq!(harness.rules.calls(), 0);

    // API-save bindings are independent of the watched set and survive.
    let response = harness
        .router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/hooks/api_saved_post")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["flushed"], true);
    assert_eq!(harness.rules.calls(), 1);
}

#[tokio::test]
async fn newly_selected_event_starts_flushing_without_restart() {
    let harness = harness(Capabilities::default()).await;

    // Narrow to one event, then select a different one.
    for patch in [
        json!({ "watched_events": ["post_saved"] }),
        json!({ "watched_events": ["menu_updated"] }),
    ] {
        let response = harness
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .method("PATCH")
                    .uri("/admin/settings")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(patch.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = harness
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/hooks/post_saved")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["flushed"], false);

    let response = harness
        .router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/hooks/menu_updated")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["flushed"], true);
    assert_eq!(harness.rules.calls(), 1);
}

#[tokio::test]
async fn api_save_hooks_flush_for_registered_content_types() {
    let harness = harness(Capabilities::default()).await;

    let response = harness
        .router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/hooks/api_saved_page")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = json_body(response).await;
    assert_eq!(body["flushed"], true);
    assert_eq!(harness.rules.calls(), 1);
}
