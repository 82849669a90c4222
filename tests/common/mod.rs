//! Shared fixtures for dispatcher integration tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use coap_dispatch::config::DispatcherConfig;
use coap_dispatch::observe::{ChannelNotifier, RelationEvent};
use coap_dispatch::{
    Arguments, Controller, Dispatcher, HandlerError, HandlerMethod, Method, ParameterType, Payload,
    ResponseCode, RouteSpec,
};
use futures_util::stream::{self, Stream};
use tokio::sync::{mpsc, Notify};

type Feed = mpsc::UnboundedSender<Result<Payload, HandlerError>>;

/// LED bank keyed by id; `PUT /led/{id}` with "on"/"off", `GET /led/{id}`.
#[derive(Default)]
pub struct Leds {
    pub calls: AtomicU32,
    states: Mutex<HashMap<String, String>>,
}

impl Leds {
    pub fn state(&self, id: &str) -> Option<String> {
        self.states.lock().unwrap().get(id).cloned()
    }
}

pub fn led_controller(leds: Arc<Leds>) -> Controller {
    Controller::singleton("led", leds)
        .mapping(RouteSpec::new().path("/led"))
        .route(
            RouteSpec::new()
                .path("/{id}")
                .method(Method::Put)
                .consumes("text/plain"),
            HandlerMethod::value(
                "set",
                [ParameterType::PathVariable("id".into()), ParameterType::Text],
                |leds: Arc<Leds>, args: Arguments| async move {
                    leds.calls.fetch_add(1, Ordering::SeqCst);
                    let id: String = args.get(0)?;
                    let state: String = args.get(1)?;
                    if state != "on" && state != "off" {
                        return Err(HandlerError::bad_request("state must be on or off"));
                    }
                    leds.states.lock().unwrap().insert(id, state);
                    Ok(())
                },
            ),
        )
        .route(
            RouteSpec::new().path("/{id}").method(Method::Get),
            HandlerMethod::value(
                "get",
                [ParameterType::PathVariable("id".into())],
                |leds: Arc<Leds>, args: Arguments| async move {
                    leds.calls.fetch_add(1, Ordering::SeqCst);
                    let id: String = args.get(0)?;
                    leds.state(&id).ok_or_else(|| {
                        HandlerError::with_code(ResponseCode::NotFound, format!("no LED {id}"))
                    })
                },
            ),
        )
}

/// Temperature sensor; every subscription gets its own feed, seeded with
/// the current reading when there is one.
pub struct Sensor {
    pub invocations: AtomicU32,
    current: Mutex<Option<String>>,
    feeds: Mutex<Vec<Feed>>,
}

impl Sensor {
    pub fn new(initial: Option<&str>) -> Arc<Self> {
        Arc::new(Self {
            invocations: AtomicU32::new(0),
            current: Mutex::new(initial.map(str::to_string)),
            feeds: Mutex::new(Vec::new()),
        })
    }

    pub fn feeds(&self) -> usize {
        self.feeds.lock().unwrap().len()
    }

    pub fn subscribe(&self) -> impl Stream<Item = Result<Payload, HandlerError>> + Send + 'static {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Some(value) = self.current.lock().unwrap().clone() {
            let _ = tx.send(Ok(Payload::text(value)));
        }
        self.feeds.lock().unwrap().push(tx);
        stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) })
    }

    pub fn publish(&self, value: &str) {
        *self.current.lock().unwrap() = Some(value.to_string());
        for feed in self.feeds.lock().unwrap().iter() {
            let _ = feed.send(Ok(Payload::text(value)));
        }
    }

    /// Fails the feed of the `index`-th subscription.
    pub fn fail(&self, index: usize, message: &str) {
        if let Some(feed) = self.feeds.lock().unwrap().get(index) {
            let _ = feed.send(Err(HandlerError::new(message)));
        }
    }

    /// Ends every feed.
    pub fn close(&self) {
        self.feeds.lock().unwrap().clear();
    }
}

pub fn sensor_controller(sensor: Arc<Sensor>) -> Controller {
    Controller::singleton("temp", sensor).route(
        RouteSpec::new().path("/temp").method(Method::Get),
        HandlerMethod::stream("observe", [], |sensor: Arc<Sensor>, _| async move {
            sensor.invocations.fetch_add(1, Ordering::SeqCst);
            Ok(sensor.subscribe())
        }),
    )
}

/// Stream handler that blocks until released, for cancellation races.
#[derive(Default)]
pub struct Gate {
    pub entered: Notify,
    pub release: Notify,
}

#[allow(dead_code)]
pub fn gated_controller(gate: Arc<Gate>) -> Controller {
    Controller::singleton("slow", gate).route(
        RouteSpec::new().path("/slow").method(Method::Get),
        HandlerMethod::stream("observe", [], |gate: Arc<Gate>, _| async move {
            gate.entered.notify_one();
            gate.release.notified().await;
            Ok(stream::iter(vec![Ok(Payload::text("late"))]))
        }),
    )
}

#[allow(dead_code)]
pub fn observe_dispatcher(
    config: DispatcherConfig,
    sensor: Arc<Sensor>,
) -> (Dispatcher, mpsc::UnboundedReceiver<RelationEvent>) {
    let (notifier, events) = ChannelNotifier::new();
    let dispatcher = Dispatcher::builder()
        .config(config)
        .notifier(Arc::new(notifier))
        .standard_resolvers()
        .controller(sensor_controller(sensor))
        .unwrap()
        .controller(led_controller(Arc::new(Leds::default())))
        .unwrap()
        .build();
    (dispatcher, events)
}

/// Next relation event, failing the test after five seconds.
#[allow(dead_code)]
pub async fn next_event(events: &mut mpsc::UnboundedReceiver<RelationEvent>) -> RelationEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for relation event")
        .expect("notifier channel closed")
}

/// Lets spawned tasks run.
#[allow(dead_code)]
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(Duration::from_millis(20)).await;
}
