#![allow(dead_code)]

use async_trait::async_trait;
use competing_consumer::subscription::{AckKind, Error, Event, Result, Transport};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use warp::http::StatusCode;
use warp::Filter;

/// Stream and group used throughout the tests
pub const STREAM: &str = "orders";
pub const GROUP: &str = "billing";

/// Build an event whose ack/nack links follow the backend's URL layout
pub fn event(id: &str) -> Event {
    Event::new(id)
        .with_type("OrderPlaced")
        .with_data(json!({ "id": id }))
        .with_link("ack", ack_uri(id))
        .with_link("nack", nack_uri(id))
}

pub fn ack_uri(id: &str) -> String {
    format!("http://es/subscriptions/{}/{}/ack/{}", STREAM, GROUP, id)
}

pub fn nack_uri(id: &str) -> String {
    format!("http://es/subscriptions/{}/{}/nack/{}", STREAM, GROUP, id)
}

/// One recorded fetch request
#[derive(Debug, Clone, Copy)]
pub struct Fetch {
    pub max_count: usize,
    pub at: Instant,
}

/// Scripted in-memory transport
///
/// Fetches are answered from the script first, then from the backlog (up to
/// the requested count), then with an empty batch.
#[derive(Default)]
pub struct MockTransport {
    script: Mutex<VecDeque<Result<Vec<Event>>>>,
    backlog: Mutex<VecDeque<Event>>,
    fetch_delay: Duration,
    ack_failures: AtomicU32,
    active_fetches: AtomicUsize,
    peak_fetches: AtomicUsize,
    fetches: Mutex<Vec<Fetch>>,
    acks: Mutex<Vec<(String, AckKind)>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the response for the next unscripted fetch
    pub fn then(self, response: Result<Vec<Event>>) -> Self {
        self.script.lock().unwrap().push_back(response);
        self
    }

    /// Events served in batches once the script is exhausted
    pub fn with_backlog(self, events: impl IntoIterator<Item = Event>) -> Self {
        self.backlog.lock().unwrap().extend(events);
        self
    }

    /// Delay every fetch response
    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = delay;
        self
    }

    /// Fail this many ack/nack calls before succeeding (`u32::MAX` = always)
    pub fn with_ack_failures(self, failures: u32) -> Self {
        self.ack_failures.store(failures, Ordering::SeqCst);
        self
    }

    pub fn fetches(&self) -> Vec<Fetch> {
        self.fetches.lock().unwrap().clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.lock().unwrap().len()
    }

    /// Most fetches that were ever outstanding at the same time
    pub fn peak_concurrent_fetches(&self) -> usize {
        self.peak_fetches.load(Ordering::SeqCst)
    }

    pub fn acks(&self) -> Vec<(String, AckKind)> {
        self.acks.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn fetch_batch(&self, stream: &str, group: &str, max_count: usize) -> Result<Vec<Event>> {
        assert_eq!(stream, STREAM);
        assert_eq!(group, GROUP);
        assert!(max_count > 0, "fetch issued without capacity");

        self.fetches.lock().unwrap().push(Fetch {
            max_count,
            at: Instant::now(),
        });

        let active = self.active_fetches.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_fetches.fetch_max(active, Ordering::SeqCst);
        if !self.fetch_delay.is_zero() {
            tokio::time::sleep(self.fetch_delay).await;
        }
        self.active_fetches.fetch_sub(1, Ordering::SeqCst);

        if let Some(response) = self.script.lock().unwrap().pop_front() {
            return response;
        }

        let mut backlog = self.backlog.lock().unwrap();
        let take = max_count.min(backlog.len());
        Ok(backlog.drain(..take).collect())
    }

    async fn acknowledge(&self, reference: &str, kind: AckKind) -> Result<()> {
        self.acks.lock().unwrap().push((reference.to_string(), kind));

        let remaining = self.ack_failures.load(Ordering::SeqCst);
        if remaining == 0 {
            return Ok(());
        }
        if remaining != u32::MAX {
            self.ack_failures.store(remaining - 1, Ordering::SeqCst);
        }
        Err(Error::Transport("connection refused".to_string()))
    }
}

/// Requests observed by the fake HTTP backend
#[derive(Debug, Default)]
pub struct BackendState {
    pub events: VecDeque<(String, String)>,
    pub fetches: Vec<FetchRequest>,
    pub settlements: Vec<(String, String)>,
    pub failing_fetches: usize,
}

#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub stream: String,
    pub group: String,
    pub count: usize,
    pub query: HashMap<String, String>,
    pub accept: Option<String>,
    pub authorization: Option<String>,
}

/// In-process competing-consumer backend served over HTTP
pub struct FakeBackend {
    pub addr: SocketAddr,
    pub state: Arc<Mutex<BackendState>>,
}

impl FakeBackend {
    /// Start the backend on a free local port
    pub async fn start() -> Self {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let addr: SocketAddr = ([127, 0, 0, 1], port).into();
        let state = Arc::new(Mutex::new(BackendState::default()));

        tokio::spawn(warp::serve(routes(addr, Arc::clone(&state))).run(addr));

        for _ in 0..100 {
            if tokio::net::TcpStream::connect(addr).await.is_ok() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        Self { addr, state }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Queue an event of the given type for leasing
    pub fn push_event(&self, id: &str, event_type: &str) {
        self.state
            .lock()
            .unwrap()
            .events
            .push_back((id.to_string(), event_type.to_string()));
    }

    pub fn fail_next_fetches(&self, count: usize) {
        self.state.lock().unwrap().failing_fetches = count;
    }

    pub fn fetches(&self) -> Vec<FetchRequest> {
        self.state.lock().unwrap().fetches.clone()
    }

    pub fn settlements(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().settlements.clone()
    }
}

fn entry(base: &str, stream: &str, group: &str, id: &str, event_type: &str) -> Value {
    json!({
        "eventId": id,
        "eventType": event_type,
        "eventNumber": 0,
        "streamId": stream,
        "data": { "id": id },
        "links": [
            { "uri": format!("{}/subscriptions/{}/{}/ack/{}", base, stream, group, id), "relation": "ack" },
            { "uri": format!("{}/subscriptions/{}/{}/nack/{}", base, stream, group, id), "relation": "nack" }
        ]
    })
}

fn routes(
    addr: SocketAddr,
    state: Arc<Mutex<BackendState>>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    let base = format!("http://{}", addr);
    let with_state = warp::any().map(move || Arc::clone(&state));

    // GET /subscriptions/{stream}/{group}/{count}
    let fetch = warp::path!("subscriptions" / String / String / usize)
        .and(warp::get())
        .and(warp::query::<HashMap<String, String>>())
        .and(warp::header::optional::<String>("accept"))
        .and(warp::header::optional::<String>("authorization"))
        .and(with_state.clone())
        .map(
            move |stream: String,
                  group: String,
                  count: usize,
                  query: HashMap<String, String>,
                  accept: Option<String>,
                  authorization: Option<String>,
                  state: Arc<Mutex<BackendState>>| {
                let mut state = state.lock().unwrap();
                state.fetches.push(FetchRequest {
                    stream: stream.clone(),
                    group: group.clone(),
                    count,
                    query,
                    accept,
                    authorization,
                });

                if state.failing_fetches > 0 {
                    state.failing_fetches -= 1;
                    return warp::reply::with_status(
                        warp::reply::json(&json!({ "error": "unavailable" })),
                        StatusCode::SERVICE_UNAVAILABLE,
                    );
                }

                let take = count.min(state.events.len());
                let entries: Vec<Value> = state
                    .events
                    .drain(..take)
                    .map(|(id, event_type)| entry(&base, &stream, &group, &id, &event_type))
                    .collect();

                warp::reply::with_status(
                    warp::reply::json(&json!({ "entries": entries })),
                    StatusCode::OK,
                )
            },
        );

    // POST /subscriptions/{stream}/{group}/{ack|nack}/{id}
    let settle = warp::path!("subscriptions" / String / String / String / String)
        .and(warp::post())
        .and(with_state)
        .map(
            |_stream: String,
             _group: String,
             relation: String,
             id: String,
             state: Arc<Mutex<BackendState>>| {
                state.lock().unwrap().settlements.push((relation, id));
                warp::reply::with_status(warp::reply(), StatusCode::ACCEPTED)
            },
        );

    fetch.or(settle)
}
