//! Scripted backend and virtual clock for exercising transports without a network.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::clock::Clock;
use crate::http::{Backend, ConnectionError, HttpRequest, HttpResponse, Method};

type Reply = Result<HttpResponse, ConnectionError>;

struct Route {
    method: Method,
    pattern: String,
    replies: VecDeque<Reply>,
}

/// Backend answering from per-route reply queues.
///
/// A request matches the route with the longest pattern contained in its
/// URL. Replies are consumed in order; the last one repeats. Unmatched
/// requests get a `404`.
#[derive(Default)]
pub struct MockBackend {
    routes: RefCell<Vec<Route>>,
    requests: RefCell<Vec<HttpRequest>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `reply` for requests whose URL contains `pattern`.
    pub fn reply(self, method: Method, pattern: &str, reply: Reply) -> Self {
        {
            let mut routes = self.routes.borrow_mut();
            match routes
                .iter_mut()
                .find(|r| r.method == method && r.pattern == pattern)
            {
                Some(route) => route.replies.push_back(reply),
                None => routes.push(Route {
                    method,
                    pattern: pattern.to_string(),
                    replies: VecDeque::from([reply]),
                }),
            }
        }
        self
    }

    /// Queue a `200` JSON reply for GET requests matching `pattern`.
    pub fn get_json(self, pattern: &str, body: Value) -> Self {
        self.reply(Method::Get, pattern, Ok(HttpResponse::new(200, body.to_string())))
    }

    /// Queue a `200` text reply for GET requests matching `pattern`.
    pub fn get_text(self, pattern: &str, body: &str) -> Self {
        self.reply(Method::Get, pattern, Ok(HttpResponse::new(200, body)))
    }

    /// Every request seen so far, in order.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.borrow().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.borrow().len()
    }

    /// URLs of every request seen so far.
    pub fn urls(&self) -> Vec<String> {
        self.requests.borrow().iter().map(|r| r.url.clone()).collect()
    }
}

impl Backend for MockBackend {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, ConnectionError> {
        self.requests.borrow_mut().push(request.clone());
        let mut routes = self.routes.borrow_mut();
        let route = routes
            .iter_mut()
            .filter(|r| r.method == request.method && request.url.contains(&r.pattern))
            .max_by_key(|r| r.pattern.len());
        match route {
            Some(route) if route.replies.len() > 1 => route
                .replies
                .pop_front()
                .unwrap_or_else(|| Ok(HttpResponse::new(404, "no reply"))),
            Some(route) => route
                .replies
                .front()
                .cloned()
                .unwrap_or_else(|| Ok(HttpResponse::new(404, "no reply"))),
            None => Ok(HttpResponse::new(404, format!("no route for {}", request.url))),
        }
    }
}

/// Virtual clock: `sleep` records the duration and advances time instantly.
pub struct ManualClock {
    origin: Instant,
    elapsed: Cell<Duration>,
    sleeps: RefCell<Vec<Duration>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            elapsed: Cell::new(Duration::ZERO),
            sleeps: RefCell::new(Vec::new()),
        }
    }

    /// Move time forward without recording a sleep.
    pub fn advance(&self, by: Duration) {
        self.elapsed.set(self.elapsed.get() + by);
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.borrow().clone()
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed.get()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed.get()
    }

    fn sleep(&self, duration: Duration) {
        self.sleeps.borrow_mut().push(duration);
        self.advance(duration);
    }
}
