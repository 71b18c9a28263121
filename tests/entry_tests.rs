//! Entry point and control-plane integration tests.

mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::StatusCode;
use tower::ServiceExt;

use rotagate::admin::{self, AdminContext};
use rotagate::entry::{self, EntryContext};
use rotagate::health;
use rotagate::rotation::{Endpoint, Registry};
use rotagate::rules::acl;
use rotagate::security::suspicion::SuspicionTracker;
use rotagate::store::memory::MemoryStore;
use rotagate::store::{CoordinationStore, ACTIVE_PROXY_KEY, DIRECTIVE_STREAM};

use common::{metrics_handle, request_from};

fn endpoints() -> Vec<Endpoint> {
    vec![
        Endpoint::new("proxy1", "host", 8081),
        Endpoint::new("proxy2", "host", 8082),
        Endpoint::new("proxy3", "host", 8083),
    ]
}

struct EntrySetup {
    store: Arc<MemoryStore>,
    registry: Arc<Registry>,
    acl: Option<acl::AclConfig>,
    suspicion: bool,
    max_suspicion: i64,
    api_key: Option<String>,
}

impl EntrySetup {
    fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let registry = Arc::new(
            Registry::new(endpoints(), store.clone() as Arc<dyn CoordinationStore>).unwrap(),
        );
        Self {
            store,
            registry,
            acl: None,
            suspicion: false,
            max_suspicion: 20,
            api_key: None,
        }
    }

    fn build(self) -> (axum::Router, Arc<MemoryStore>, Arc<Registry>) {
        let store: Arc<dyn CoordinationStore> = self.store.clone();
        let admin_router = self.api_key.clone().map(|api_key| {
            admin::router(Arc::new(AdminContext {
                registry: self.registry.clone(),
                store: store.clone(),
                api_key,
                health_client: health::probe_client().unwrap(),
            }))
        });
        let ctx = Arc::new(EntryContext {
            registry: self.registry.clone(),
            acl: self.acl,
            suspicion: self
                .suspicion
                .then(|| SuspicionTracker::new(store, self.max_suspicion)),
            metrics: metrics_handle(),
            api_enabled: admin_router.is_some(),
        });
        (
            entry::router(ctx, admin_router),
            self.store,
            self.registry,
        )
    }
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8_lossy(&bytes).to_string()
}

#[tokio::test]
async fn entry_redirects_with_307_to_the_active_proxy() {
    let (router, _, registry) = EntrySetup::new().build();
    let active = registry.current();

    let request = request_from("10.0.0.5:40000", "GET", "/some/page?x=1", "front", Body::empty());
    let response = router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(
        response.headers().get("location").unwrap().to_str().unwrap(),
        format!("{}/some/page?x=1", active.url())
    );
}

#[tokio::test]
async fn entry_follows_the_cursor_after_a_rotation() {
    let (router, store, registry) = EntrySetup::new().build();

    let active = registry.rotate().await.unwrap();
    assert_eq!(
        store.get(ACTIVE_PROXY_KEY).await.unwrap().as_deref(),
        Some(active.url().as_str())
    );

    let request = request_from("10.0.0.5:40000", "GET", "/uri", "front", Body::empty());
    let response = router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(
        response.headers().get("location").unwrap().to_str().unwrap(),
        format!("{}/uri", active.url())
    );
}

#[tokio::test]
async fn acl_deny_short_circuits_the_entry() {
    let dir = std::env::temp_dir().join(format!("rotagate-acl-{}", std::process::id()));
    std::fs::write(
        &dir,
        "rules:\n  - name: block-admin\n    condition: path-prefix\n    value: /wp-admin\n    action: deny\n    options: [\"status=403\", \"body=blocked\"]\n",
    )
    .unwrap();
    let acl = acl::load(&dir).unwrap();
    std::fs::remove_file(&dir).ok();

    let mut setup = EntrySetup::new();
    setup.acl = Some(acl);
    let (router, _, _) = setup.build();

    let request = request_from("10.0.0.5:40000", "GET", "/wp-admin/setup.php", "front", Body::empty());
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_string(response).await, "blocked");

    let request = request_from("10.0.0.5:40000", "GET", "/fine", "front", Body::empty());
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
}

#[tokio::test]
async fn suspicious_source_is_refused_past_the_threshold() {
    let mut setup = EntrySetup::new();
    setup.suspicion = true;
    setup.max_suspicion = 20;
    let store = setup.store.clone();
    let (router, _, _) = setup.build();

    store.incr("suspicion:10.0.0.9", 21).await.unwrap();

    let request = request_from("10.0.0.9:40000", "GET", "/", "front", Body::empty());
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // A clean source still gets redirected, and picks up baseline score.
    let request = request_from("10.0.0.10:40000", "GET", "/", "front", Body::empty());
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(
        store.get("suspicion:10.0.0.10").await.unwrap().as_deref(),
        Some("1")
    );
}

#[tokio::test]
async fn detected_attack_is_penalized_harder_than_baseline() {
    let mut setup = EntrySetup::new();
    setup.suspicion = true;
    let store = setup.store.clone();
    let (router, _, _) = setup.build();

    let request = request_from(
        "10.0.0.11:40000",
        "GET",
        "/download?file=../../etc/passwd",
        "front",
        Body::empty(),
    );
    let response = router.oneshot(request).await.unwrap();
    // Still redirected (rating 6 is under the threshold), but penalized
    // with attack + baseline increments.
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(
        store.get("suspicion:10.0.0.11").await.unwrap().as_deref(),
        Some("6")
    );
}

#[tokio::test]
async fn api_prefix_without_api_enabled_is_404() {
    let (router, _, _) = EntrySetup::new().build();

    let request = request_from("10.0.0.5:40000", "GET", "/api/status", "front", Body::empty());
    let response = router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_string(response).await, "API not enabled");
}

#[tokio::test]
async fn metrics_endpoint_renders_prometheus_text() {
    let (router, _, registry) = EntrySetup::new().build();
    registry.rotate().await.unwrap();

    let request = request_from("10.0.0.5:40000", "GET", "/metrics", "front", Body::empty());
    let response = router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_string(response).await;
    assert!(body.contains("proxy_switches_total"));
}

#[tokio::test]
async fn admin_routes_require_the_bearer_key() {
    let mut setup = EntrySetup::new();
    setup.api_key = Some("test-key".to_string());
    let (router, _, _) = setup.build();

    let request = request_from("10.0.0.5:40000", "GET", "/api/status", "front", Body::empty());
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let mut request = request_from("10.0.0.5:40000", "GET", "/api/status", "front", Body::empty());
    request
        .headers_mut()
        .insert("authorization", "Bearer test-key".parse().unwrap());
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_string(response).await.contains("operational"));
}

#[tokio::test]
async fn admin_rotate_moves_the_cursor_and_the_record() {
    let mut setup = EntrySetup::new();
    setup.api_key = Some("test-key".to_string());
    let (router, store, registry) = setup.build();

    let mut request = request_from("10.0.0.5:40000", "POST", "/api/rotate", "front", Body::empty());
    request
        .headers_mut()
        .insert("authorization", "Bearer test-key".parse().unwrap());
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let recorded = store.get(ACTIVE_PROXY_KEY).await.unwrap().unwrap();
    assert_eq!(recorded, registry.current().url());
}

#[tokio::test]
async fn admin_directive_lands_on_the_stream() {
    let mut setup = EntrySetup::new();
    setup.api_key = Some("test-key".to_string());
    let store = setup.store.clone();
    store
        .ensure_group(DIRECTIVE_STREAM, "proxy_group")
        .await
        .unwrap();
    let (router, _, _) = setup.build();

    let mut request = request_from(
        "10.0.0.5:40000",
        "POST",
        "/api/directives",
        "front",
        Body::from("{\"block\":true}"),
    );
    request
        .headers_mut()
        .insert("authorization", "Bearer test-key".parse().unwrap());
    request
        .headers_mut()
        .insert("content-type", "application/json".parse().unwrap());
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let entries = store
        .xread_group(
            DIRECTIVE_STREAM,
            "proxy_group",
            "test",
            10,
            std::time::Duration::ZERO,
        )
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].fields.get("block").map(String::as_str), Some("true"));
}

#[tokio::test]
async fn every_subscriber_sees_a_switch_announcement() {
    let (_, store, registry) = EntrySetup::new().build();

    let mut first = store.subscribe("proxy_updates").await.unwrap();
    let mut second = store.subscribe("proxy_updates").await.unwrap();

    let active = registry.rotate().await.unwrap();

    for rx in [&mut first, &mut second] {
        let seen = tokio::time::timeout(std::time::Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(seen, active.url());
    }
}
