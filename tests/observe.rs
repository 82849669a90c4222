//! Observe relation tests: subscription, caching, notifications and
//! cancellation.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use coap_dispatch::config::DispatcherConfig;
use coap_dispatch::observe::{ChannelNotifier, ObservationState, RelationEvent};
use coap_dispatch::{
    ContentFormat, Controller, Dispatcher, HandlerError, HandlerMethod, Method, Observe, Payload,
    RelationId, RelationKey, Request, ResponseCode, RouteSpec,
};
use futures_util::{stream, StreamExt};
use tokio::sync::mpsc::error::TryRecvError;

mod common;

use common::{gated_controller, next_event, observe_dispatcher, settle, Gate, Sensor};

fn subscribe(path: &str, relation: &str) -> Request {
    Request::get(path)
        .observe(Observe::Register)
        .relation(relation)
        .build()
}

fn key(relation: &str) -> RelationKey {
    RelationKey::new("/temp", RelationId::new(relation))
}

#[tokio::test]
async fn test_subscribe_returns_first_value_then_cached() {
    let sensor = Sensor::new(Some("20.0"));
    let (dispatcher, _events) = observe_dispatcher(DispatcherConfig::default(), Arc::clone(&sensor));

    let first = dispatcher.dispatch(subscribe("/temp", "peer-1")).await;
    assert_eq!(first.code, Some(ResponseCode::Content));
    assert_eq!(first.payload_str(), Some("20.0"));
    assert_eq!(first.content_format, Some(ContentFormat::TEXT_PLAIN));
    assert_eq!(first.observe, Some(0));

    let ctx = dispatcher.relations().get(&key("peer-1")).unwrap();
    assert!(matches!(ctx.state(), ObservationState::Active { .. }));

    let again = dispatcher.dispatch(subscribe("/temp", "peer-1")).await;
    assert_eq!(again.payload_str(), Some("20.0"));
    assert_eq!(again.observe, Some(0));
    assert_eq!(sensor.invocations.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_cached_value_follows_emissions() {
    let sensor = Sensor::new(Some("20.0"));
    let (dispatcher, mut events) =
        observe_dispatcher(DispatcherConfig::default(), Arc::clone(&sensor));

    dispatcher.dispatch(subscribe("/temp", "peer-1")).await;
    sensor.publish("20.5");
    next_event(&mut events).await;

    let again = dispatcher.dispatch(subscribe("/temp", "peer-1")).await;
    assert_eq!(again.payload_str(), Some("20.5"));
    assert_eq!(again.observe, Some(1));
    assert_eq!(sensor.invocations.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_concurrent_subscribes_invoke_handler_once() {
    let sensor = Sensor::new(None);
    let (dispatcher, _events) = observe_dispatcher(DispatcherConfig::default(), Arc::clone(&sensor));

    let publisher = async {
        while sensor.feeds() == 0 {
            tokio::task::yield_now().await;
        }
        settle().await;
        sensor.publish("19.0");
    };
    let (a, b, ()) = tokio::join!(
        dispatcher.dispatch(subscribe("/temp", "peer-1")),
        dispatcher.dispatch(subscribe("/temp", "peer-1")),
        publisher,
    );

    assert_eq!(sensor.invocations.load(Ordering::SeqCst), 1);
    assert_eq!(a.payload_str(), Some("19.0"));
    assert_eq!(b.payload_str(), Some("19.0"));
    assert_eq!(dispatcher.relations().len(), 1);
}

#[tokio::test]
async fn test_notifications_follow_stream_order() {
    let sensor = Sensor::new(Some("20.0"));
    let (dispatcher, mut events) =
        observe_dispatcher(DispatcherConfig::default(), Arc::clone(&sensor));

    dispatcher.dispatch(subscribe("/temp", "peer-1")).await;
    for value in ["20.1", "20.2", "20.3"] {
        sensor.publish(value);
    }

    for (sequence, value) in [(1, "20.1"), (2, "20.2"), (3, "20.3")] {
        match next_event(&mut events).await {
            RelationEvent::Notification { key: k, response } => {
                assert_eq!(k, key("peer-1"));
                assert_eq!(response.observe, Some(sequence));
                assert_eq!(response.code, Some(ResponseCode::Content));
                assert_eq!(response.payload_str(), Some(value));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_late_emission_after_cancel_is_dropped() {
    let sensor = Sensor::new(Some("20.0"));
    let (dispatcher, mut events) =
        observe_dispatcher(DispatcherConfig::default(), Arc::clone(&sensor));

    dispatcher.dispatch(subscribe("/temp", "peer-1")).await;
    let ctx = dispatcher.relations().get(&key("peer-1")).unwrap();

    assert!(dispatcher.on_relation_removed("/temp", &RelationId::new("peer-1")));
    sensor.publish("99.9");
    settle().await;

    assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
    assert!(dispatcher.relations().is_empty());
    assert!(matches!(ctx.state(), ObservationState::Closed(_)));
    assert_eq!(ctx.last_result().unwrap().sequence, 0);

    // removing twice is harmless
    assert!(!dispatcher.on_relation_removed("/temp", &RelationId::new("peer-1")));
}

#[tokio::test]
async fn test_deregister_is_served_one_shot() {
    let sensor = Sensor::new(Some("20.0"));
    let (dispatcher, _events) = observe_dispatcher(DispatcherConfig::default(), Arc::clone(&sensor));

    dispatcher.dispatch(subscribe("/temp", "peer-1")).await;
    let request = Request::get("/temp")
        .observe(Observe::Deregister)
        .relation("peer-1")
        .build();
    let response = dispatcher.dispatch(request).await;

    assert_eq!(response.payload_str(), Some("20.0"));
    assert_eq!(response.observe, None);
    assert!(dispatcher.relations().is_empty());
    assert_eq!(sensor.invocations.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_plain_request_to_stream_handler() {
    let sensor = Sensor::new(Some("18.5"));
    let (dispatcher, _events) = observe_dispatcher(DispatcherConfig::default(), Arc::clone(&sensor));

    let response = dispatcher.dispatch(Request::get("/temp").build()).await;
    assert_eq!(response.payload_str(), Some("18.5"));
    assert_eq!(response.observe, None);
    assert!(dispatcher.relations().is_empty());
}

#[tokio::test]
async fn test_stream_failure_ends_only_its_relation() {
    let sensor = Sensor::new(Some("20.0"));
    let (dispatcher, mut events) =
        observe_dispatcher(DispatcherConfig::default(), Arc::clone(&sensor));

    dispatcher.dispatch(subscribe("/temp", "peer-1")).await;
    dispatcher.dispatch(subscribe("/temp", "peer-2")).await;
    assert_eq!(dispatcher.relations().len(), 2);

    sensor.fail(0, "sensor offline");
    match next_event(&mut events).await {
        RelationEvent::Terminated { key: k, response } => {
            assert_eq!(k, key("peer-1"));
            let response = response.unwrap();
            assert_eq!(response.code, Some(ResponseCode::InternalServerError));
            assert!(response.payload.is_empty());
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(dispatcher.relations().len(), 1);

    sensor.publish("20.4");
    match next_event(&mut events).await {
        RelationEvent::Notification { key: k, response } => {
            assert_eq!(k, key("peer-2"));
            assert_eq!(response.payload_str(), Some("20.4"));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn test_failure_before_first_value_answers_the_subscriber() {
    let sensor = Sensor::new(None);
    let (dispatcher, mut events) =
        observe_dispatcher(DispatcherConfig::default(), Arc::clone(&sensor));

    let failer = async {
        while sensor.feeds() == 0 {
            tokio::task::yield_now().await;
        }
        sensor.fail(0, "sensor offline");
    };
    let (response, ()) = tokio::join!(dispatcher.dispatch(subscribe("/temp", "peer-1")), failer);

    assert_eq!(response.code, Some(ResponseCode::InternalServerError));
    assert!(dispatcher.relations().is_empty());
    settle().await;
    assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn test_stream_completion_terminates_relation() {
    let sensor = Sensor::new(Some("20.0"));
    let (dispatcher, mut events) =
        observe_dispatcher(DispatcherConfig::default(), Arc::clone(&sensor));

    dispatcher.dispatch(subscribe("/temp", "peer-1")).await;
    sensor.close();

    match next_event(&mut events).await {
        RelationEvent::Terminated { key: k, response } => {
            assert_eq!(k, key("peer-1"));
            assert!(response.is_none());
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(dispatcher.relations().is_empty());
}

#[tokio::test]
async fn test_observe_on_value_handler_keeps_no_relation() {
    let sensor = Sensor::new(None);
    let (dispatcher, _events) = observe_dispatcher(DispatcherConfig::default(), sensor);

    let put = Request::builder(coap_dispatch::Method::Put, "/led/1")
        .content_format(ContentFormat::TEXT_PLAIN)
        .payload("on")
        .build();
    dispatcher.dispatch(put).await;

    let response = dispatcher.dispatch(subscribe("/led/1", "peer-1")).await;
    assert_eq!(response.code, Some(ResponseCode::Content));
    assert_eq!(response.payload_str(), Some("on"));
    assert_eq!(response.observe, None);
    assert!(dispatcher.relations().is_empty());
}

#[tokio::test]
async fn test_relation_limit_serves_one_shot() {
    let sensor = Sensor::new(Some("20.0"));
    let mut config = DispatcherConfig::default();
    config.observe.max_relations = 1;
    let (dispatcher, _events) = observe_dispatcher(config, Arc::clone(&sensor));

    let first = dispatcher.dispatch(subscribe("/temp", "peer-1")).await;
    let second = dispatcher.dispatch(subscribe("/temp", "peer-2")).await;

    assert_eq!(first.observe, Some(0));
    assert_eq!(second.observe, None);
    assert_eq!(second.payload_str(), Some("20.0"));
    assert_eq!(dispatcher.relations().len(), 1);
}

#[tokio::test]
async fn test_observe_disabled() {
    let sensor = Sensor::new(Some("20.0"));
    let mut config = DispatcherConfig::default();
    config.observe.enabled = false;
    let (dispatcher, _events) = observe_dispatcher(config, Arc::clone(&sensor));

    let response = dispatcher.dispatch(subscribe("/temp", "peer-1")).await;
    assert_eq!(response.observe, None);
    assert!(dispatcher.relations().is_empty());
}

#[tokio::test]
async fn test_shutdown_cancels_every_relation() {
    let sensor = Sensor::new(Some("20.0"));
    let (dispatcher, mut events) =
        observe_dispatcher(DispatcherConfig::default(), Arc::clone(&sensor));

    for peer in ["a", "b", "c"] {
        dispatcher.dispatch(subscribe("/temp", peer)).await;
    }
    assert_eq!(dispatcher.relations().len(), 3);

    dispatcher.shutdown();
    sensor.publish("21.0");
    settle().await;

    assert!(dispatcher.relations().is_empty());
    assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn test_announced_relation_then_subscribe() {
    let sensor = Sensor::new(Some("20.0"));
    let (dispatcher, _events) = observe_dispatcher(DispatcherConfig::default(), Arc::clone(&sensor));

    dispatcher.on_relation_added("/temp", RelationId::new("peer-1"));
    let ctx = dispatcher.relations().get(&key("peer-1")).unwrap();
    assert_eq!(ctx.state(), ObservationState::Idle);

    let response = dispatcher.dispatch(subscribe("/temp", "peer-1")).await;
    assert_eq!(response.observe, Some(0));
    assert!(matches!(ctx.state(), ObservationState::Active { .. }));
}

#[tokio::test]
async fn test_cancel_while_subscribing() {
    let gate = Arc::new(Gate::default());
    let (notifier, _events) = ChannelNotifier::new();
    let dispatcher = Dispatcher::builder()
        .notifier(Arc::new(notifier))
        .controller(gated_controller(Arc::clone(&gate)))
        .unwrap()
        .build();

    let canceller = async {
        gate.entered.notified().await;
        assert!(dispatcher.on_relation_removed("/slow", &RelationId::new("peer-1")));
        gate.release.notify_one();
    };
    let (response, ()) = tokio::join!(dispatcher.dispatch(subscribe("/slow", "peer-1")), canceller);

    assert_eq!(response.code, Some(ResponseCode::ServiceUnavailable));
    assert!(dispatcher.relations().is_empty());
}

/// `GET /faulty`: a stream whose first poll panics.
fn faulty_controller() -> Controller {
    Controller::stateless("faulty").route(
        RouteSpec::new().path("/faulty").method(Method::Get),
        HandlerMethod::stream("observe", [], |_: Arc<()>, _| async {
            Ok(stream::iter(vec![0]).map(|_| -> Result<Payload, HandlerError> {
                panic!("sensor bus fault")
            }))
        }),
    )
}

fn faulty_dispatcher() -> (Dispatcher, tokio::sync::mpsc::UnboundedReceiver<RelationEvent>) {
    let (notifier, events) = ChannelNotifier::new();
    let dispatcher = Dispatcher::builder()
        .notifier(Arc::new(notifier))
        .controller(faulty_controller())
        .unwrap()
        .build();
    (dispatcher, events)
}

#[tokio::test]
async fn test_panicking_stream_answers_the_subscriber() {
    let (dispatcher, mut events) = faulty_dispatcher();

    let response = tokio::time::timeout(
        Duration::from_secs(5),
        dispatcher.dispatch(subscribe("/faulty", "peer-1")),
    )
    .await
    .expect("subscriber left unanswered");

    assert_eq!(response.code, Some(ResponseCode::InternalServerError));
    assert_eq!(response.observe, None);
    assert!(dispatcher.relations().is_empty());
    settle().await;
    assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn test_panicking_stream_one_shot() {
    let (dispatcher, _events) = faulty_dispatcher();

    let response = dispatcher.dispatch(Request::get("/faulty").build()).await;
    assert_eq!(response.code, Some(ResponseCode::InternalServerError));

    let error = dispatcher.handle(Request::get("/faulty").build()).await.unwrap_err();
    assert!(error.to_string().contains("stream panicked: sensor bus fault"));
}
