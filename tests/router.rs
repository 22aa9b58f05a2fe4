use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use async_trait::async_trait;

use tokio::sync::Notify;

use uri_router::{
    handlers::{build_text_response, HttpRequest, HttpResponse, RequestHandler},
    router::{DrainPolicy, HandlerStatus, Method, Mutability, RouteError, Router},
};

struct NamedHandler {
    name: String,
}

#[async_trait]
impl RequestHandler for NamedHandler {
    async fn call(&self, _request: &HttpRequest<'_>) -> anyhow::Result<HttpResponse> {
        Ok(build_text_response(http::StatusCode::OK, self.name.clone()))
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}

/// Blocks inside the call until the gate is opened.
struct GateHandler {
    gate: Arc<Notify>,
}

#[async_trait]
impl RequestHandler for GateHandler {
    async fn call(&self, _request: &HttpRequest<'_>) -> anyhow::Result<HttpResponse> {
        self.gate.notified().await;
        Ok(build_text_response(http::StatusCode::OK, "gate"))
    }

    fn describe(&self) -> String {
        "gate".to_string()
    }
}

struct PanicHandler;

#[async_trait]
impl RequestHandler for PanicHandler {
    async fn call(&self, _request: &HttpRequest<'_>) -> anyhow::Result<HttpResponse> {
        panic!("handler panicked");
    }

    fn describe(&self) -> String {
        "panic".to_string()
    }
}

fn named(name: &str) -> Arc<dyn RequestHandler> {
    Arc::new(NamedHandler {
        name: name.to_string(),
    })
}

fn short_drain_router() -> Arc<Router> {
    Arc::new(
        Router::new(DrainPolicy {
            attempts: 5,
            interval: Duration::from_millis(1),
        })
        .unwrap(),
    )
}

fn status_of(router: &Router, method: Method, pattern: &str) -> HandlerStatus {
    router
        .snapshot()
        .into_iter()
        .find(|status| status.method == method.as_str() && status.pattern == pattern)
        .unwrap()
}

#[test]
fn test_earlier_registration_wins() {
    let router = short_drain_router();
    router
        .register_get("/files/.*", named("files"), Mutability::Replaceable)
        .unwrap();
    router
        .register_get("/files/readme", named("readme"), Mutability::Replaceable)
        .unwrap();
    router
        .register_get("/other/.*", named("other"), Mutability::Replaceable)
        .unwrap();

    let call = router.dispatch(Method::Get, "/Files/README/").unwrap();
    assert_eq!(call.describe(), "files");
}

#[test]
fn test_immutable_replace_is_refused() {
    let router = short_drain_router();
    router
        .register_get("/status", named("status"), Mutability::Immutable)
        .unwrap();

    assert_eq!(
        router.replace(Method::Get, "/status/", named("imposter")),
        Err(RouteError::Immutable)
    );
    assert_eq!(
        router.dispatch(Method::Get, "/status").unwrap().describe(),
        "status"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_replace_busy_while_call_in_flight() {
    let router = short_drain_router();
    let gate = Arc::new(Notify::new());
    router
        .register_get(
            "/slow",
            Arc::new(GateHandler {
                gate: Arc::clone(&gate),
            }),
            Mutability::Replaceable,
        )
        .unwrap();

    let live_call = router.dispatch(Method::Get, "/slow").unwrap();
    let in_flight = tokio::spawn(async move {
        let request = HttpRequest::new("GET", "/slow");
        live_call.call(&request).await.map(|response| response.status())
    });

    let replace_result = {
        let router = Arc::clone(&router);
        tokio::task::spawn_blocking(move || router.replace(Method::Get, "/slow", named("fast")))
            .await
            .unwrap()
    };
    assert_eq!(replace_result, Err(RouteError::Busy { live_calls: 1 }));
    assert_eq!(
        router.dispatch(Method::Get, "/slow").unwrap().describe(),
        "gate"
    );

    gate.notify_one();
    assert_eq!(in_flight.await.unwrap().unwrap(), http::StatusCode::OK);

    let status = status_of(&router, Method::Get, "/slow");
    assert_eq!(status.live_calls, 0);
    assert_eq!(status.success_count, 1);

    assert_eq!(router.replace(Method::Get, "/slow", named("fast")), Ok(()));
    assert_eq!(
        router.dispatch(Method::Get, "/slow").unwrap().describe(),
        "fast"
    );
}

#[tokio::test]
async fn test_live_call_released_on_panic_and_cancel() {
    let router = short_drain_router();
    let gate = Arc::new(Notify::new());
    router
        .register_get("/panic", Arc::new(PanicHandler), Mutability::Replaceable)
        .unwrap();
    router
        .register_get(
            "/stuck",
            Arc::new(GateHandler {
                gate: Arc::clone(&gate),
            }),
            Mutability::Replaceable,
        )
        .unwrap();

    let live_call = router.dispatch(Method::Get, "/panic").unwrap();
    let panicked = tokio::spawn(async move {
        let request = HttpRequest::new("GET", "/panic");
        live_call.call(&request).await.is_ok()
    })
    .await;
    assert!(panicked.is_err());

    let status = status_of(&router, Method::Get, "/panic");
    assert_eq!(status.live_calls, 0);
    assert_eq!(status.success_count, 0);
    assert_eq!(status.fail_count, 0);

    let live_call = router.dispatch(Method::Get, "/stuck").unwrap();
    let stuck = tokio::spawn(async move {
        let request = HttpRequest::new("GET", "/stuck");
        live_call.call(&request).await.is_ok()
    });
    tokio::task::yield_now().await;
    stuck.abort();
    assert!(stuck.await.unwrap_err().is_cancelled());

    assert_eq!(status_of(&router, Method::Get, "/stuck").live_calls, 0);
    assert_eq!(router.replace(Method::Get, "/panic", named("calm")), Ok(()));
    assert_eq!(router.replace(Method::Get, "/stuck", named("free")), Ok(()));
}

#[test]
fn test_concurrent_dispatch_sees_whole_entries() {
    let router = short_drain_router();
    router
        .register_get("/swap", named("v0"), Mutability::Replaceable)
        .unwrap();

    let done = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let router = Arc::clone(&router);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                while !done.load(Ordering::Relaxed) {
                    let description = router.dispatch(Method::Get, "/swap").unwrap().describe();
                    assert!(description == "v0" || description == "v1");

                    for i in 0..50 {
                        if let Ok(call) = router.dispatch(Method::Get, &format!("/late/{}", i)) {
                            assert_eq!(call.describe(), format!("late{}", i));
                        }
                    }
                }
            })
        })
        .collect();

    for i in 0..50 {
        router
            .register_get(
                &format!("/late/{}", i),
                named(&format!("late{}", i)),
                Mutability::Replaceable,
            )
            .unwrap();

        let version = if i % 2 == 0 { "v1" } else { "v0" };
        match router.replace(Method::Get, "/swap", named(version)) {
            Ok(()) | Err(RouteError::Busy { .. }) => {}
            Err(err) => panic!("unexpected replace error {}", err),
        }
    }

    done.store(true, Ordering::Relaxed);
    for reader in readers {
        reader.join().unwrap();
    }

    for i in 0..50 {
        assert!(router.check_exists(Method::Get, &format!("/late/{}", i)));
    }
}
