//! End-to-end dispatch scenarios against an in-process stub transport.
//!
//! # Design
//! `ServerStub` plays the server: it records every request, answers from a
//! table of canned responses keyed by URL, can echo the request body back,
//! and can hold callbacks so a test controls exactly when (and whether) a
//! request completes.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use requestor_core::{
    Container, DeserializationContext, Deserializer, FormData, Header, HttpMethod, HttpRequest,
    HttpResponse, Outcome, Progress, RequestError, Requestor, ResponseCallback, SerdesError, State,
    Transport, TransportError, UriBuilder,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Person {
    id: u32,
    name: String,
    weight: f64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    birthday: DateTime<Utc>,
}

#[derive(Clone)]
enum Reply {
    Canned(HttpResponse),
    Echo,
    Fail(TransportError),
}

#[derive(Default)]
struct StubState {
    replies: Mutex<HashMap<String, Reply>>,
    requests: Mutex<Vec<HttpRequest>>,
    held: Mutex<Vec<(HttpRequest, ResponseCallback)>>,
    hold: Mutex<bool>,
}

#[derive(Clone, Default)]
struct ServerStub {
    state: Arc<StubState>,
}

impl ServerStub {
    fn reply(&self, url: &str, status: u16, content_type: &str, body: &str) {
        self.state.replies.lock().insert(
            url.to_string(),
            Reply::Canned(HttpResponse {
                status,
                status_text: status_text(status).to_string(),
                headers: vec![("Content-Type".to_string(), content_type.to_string())],
                body: body.to_string(),
            }),
        );
    }

    fn echo(&self, url: &str) {
        self.state.replies.lock().insert(url.to_string(), Reply::Echo);
    }

    fn fail(&self, url: &str, err: TransportError) {
        self.state.replies.lock().insert(url.to_string(), Reply::Fail(err));
    }

    fn hold(&self) {
        *self.state.hold.lock() = true;
    }

    /// Complete every held request, emitting `progress` first.
    fn release(&self, progress: &[Progress]) {
        *self.state.hold.lock() = false;
        let held: Vec<_> = self.state.held.lock().drain(..).collect();
        for (request, callback) in held {
            for p in progress {
                callback.on_progress(*p);
            }
            self.answer(request, callback);
        }
    }

    fn requests(&self) -> Vec<HttpRequest> {
        self.state.requests.lock().clone()
    }

    fn answer(&self, request: HttpRequest, callback: ResponseCallback) {
        let reply = self.state.replies.lock().get(&request.url).cloned();
        match reply {
            Some(Reply::Canned(response)) => callback.on_response(response),
            Some(Reply::Echo) => callback.on_response(HttpResponse {
                status: 200,
                status_text: "OK".to_string(),
                headers: vec![(
                    "Content-Type".to_string(),
                    request.headers.value("Content-Type").unwrap_or_default(),
                )],
                body: request.body.clone().unwrap_or_default(),
            }),
            Some(Reply::Fail(err)) => callback.on_error(err),
            None => callback.on_response(HttpResponse {
                status: 404,
                status_text: "Not Found".to_string(),
                headers: Vec::new(),
                body: String::new(),
            }),
        }
    }
}

impl Transport for ServerStub {
    fn send(&self, request: HttpRequest, callback: ResponseCallback) -> Result<(), TransportError> {
        self.state.requests.lock().push(request.clone());
        if *self.state.hold.lock() {
            self.state.held.lock().push((request, callback));
        } else {
            self.answer(request, callback);
        }
        Ok(())
    }
}

fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "",
    }
}

fn setup() -> (Requestor, ServerStub) {
    let stub = ServerStub::default();
    (Requestor::new(stub.clone()), stub)
}

fn counter() -> (Arc<AtomicUsize>, Arc<AtomicUsize>) {
    let count = Arc::new(AtomicUsize::new(0));
    (Arc::clone(&count), count)
}

#[test]
fn person_post_round_trip() {
    let (requestor, stub) = setup();
    stub.echo("/person");
    let _json = requestor.register_json::<Person>().unwrap();

    let person = Person {
        id: 1,
        name: "John Doe".to_string(),
        weight: 6.3,
        birthday: Utc.with_ymd_and_hms(1980, 6, 10, 0, 0, 0).unwrap(),
    };

    let received = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&received);
    requestor
        .request("/person")
        .payload(person.clone())
        .post::<Person>()
        .unwrap()
        .done(move |p| *slot.lock() = p.cloned());

    assert_eq!(received.lock().as_ref(), Some(&person));

    let sent = &stub.requests()[0];
    assert_eq!(sent.method, HttpMethod::Post);
    assert_eq!(sent.headers.value("Content-Type").as_deref(), Some("application/json"));
    assert!(sent.body.as_deref().unwrap().contains("\"birthday\":329443200000"));
}

#[test]
fn string_array_with_irregular_whitespace() {
    let (requestor, stub) = setup();
    stub.reply(
        "/string-array",
        200,
        "application/json",
        "[\"Some\"  , \"string\",\n  \"array\" ,\"response\"  ]",
    );

    let deferred = requestor
        .request("/string-array")
        .send_collection::<String, Vec<String>>(HttpMethod::Get)
        .unwrap();
    match deferred.outcome() {
        Some(Outcome::Resolved(Some(items))) => {
            assert_eq!(items, &vec!["Some", "string", "array", "response"])
        }
        other => panic!("unexpected outcome: {other:?}"),
    }

    let sorted = requestor
        .request("/string-array")
        .send_collection::<String, BTreeSet<String>>(HttpMethod::Get)
        .unwrap();
    match sorted.outcome() {
        Some(Outcome::Resolved(Some(items))) => {
            assert_eq!(items.iter().next().map(String::as_str), Some("Some"));
            assert_eq!(items.len(), 4);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[test]
fn failing_request_fires_fail_and_always_once() {
    let (requestor, stub) = setup();
    stub.reply("/failure", 404, "text/plain", "missing");

    let (dones, done_count) = counter();
    let (fails, fail_count) = counter();
    let (always, always_count) = counter();
    let status = Arc::new(Mutex::new(None));
    let status_slot = Arc::clone(&status);

    requestor
        .request("/failure")
        .get::<String>()
        .unwrap()
        .done(move |_| {
            dones.fetch_add(1, Ordering::SeqCst);
        })
        .fail(move |err| {
            *status_slot.lock() = err.status();
            fails.fetch_add(1, Ordering::SeqCst);
        })
        .always(move |_| {
            always.fetch_add(1, Ordering::SeqCst);
        });

    assert_eq!(done_count.load(Ordering::SeqCst), 0);
    assert_eq!(fail_count.load(Ordering::SeqCst), 1);
    assert_eq!(always_count.load(Ordering::SeqCst), 1);
    assert_eq!(*status.lock(), Some(404));
}

#[test]
fn most_specific_status_callback_replaces_done() {
    let (requestor, stub) = setup();
    stub.reply("/server/books/1", 204, "application/json", "");

    let fired = Arc::new(Mutex::new(Vec::new()));
    let (on_20, on_2) = (Arc::clone(&fired), Arc::clone(&fired));
    let (dones, done_count) = counter();
    let (always, always_count) = counter();

    let deferred = requestor
        .request("/server/books/1")
        .on(20, move |r| on_20.lock().push(format!("20:{}", r.status)))
        .on(2, move |r| on_2.lock().push(format!("2:{}", r.status)))
        .delete::<()>()
        .unwrap();
    deferred
        .done(move |_| {
            dones.fetch_add(1, Ordering::SeqCst);
        })
        .always(move |_| {
            always.fetch_add(1, Ordering::SeqCst);
        });

    assert_eq!(*fired.lock(), vec!["20:204"]);
    assert_eq!(done_count.load(Ordering::SeqCst), 0);
    assert_eq!(always_count.load(Ordering::SeqCst), 1);
    assert_eq!(deferred.state(), State::Resolved);
}

#[test]
fn status_callbacks_chained_after_synchronous_answer() {
    let (requestor, stub) = setup();
    stub.reply("/server/books/3", 204, "application/json", "");

    let fired = Arc::new(Mutex::new(Vec::new()));
    let (on_20, on_2, done) = (Arc::clone(&fired), Arc::clone(&fired), Arc::clone(&fired));
    requestor
        .request("/server/books/3")
        .delete::<()>()
        .unwrap()
        .on(20, move |c| on_20.lock().push(format!("20:{}", c.response().unwrap().status)))
        .on(2, move |_| on_2.lock().push("2".to_string()))
        .done(move |_| done.lock().push("done".to_string()));

    assert_eq!(*fired.lock(), vec!["20:204"]);
}

#[test]
fn status_callback_on_error_status_still_rejects_once() {
    let (requestor, stub) = setup();
    stub.reply("/failure", 500, "text/plain", "boom");

    let (scoped, scoped_count) = counter();
    let (fails, fail_count) = counter();
    let deferred = requestor
        .request("/failure")
        .on(5, move |_| {
            scoped.fetch_add(1, Ordering::SeqCst);
        })
        .get::<String>()
        .unwrap();
    deferred.fail(move |_| {
        fails.fetch_add(1, Ordering::SeqCst);
    });

    assert_eq!(scoped_count.load(Ordering::SeqCst), 1);
    assert_eq!(fail_count.load(Ordering::SeqCst), 0);
    assert!(deferred.is_rejected());
}

/// Deserializer that reports which registration handled the body.
struct Tagging {
    tag: &'static str,
    patterns: &'static [&'static str],
}

impl Deserializer<String> for Tagging {
    fn accept(&self) -> &[&str] {
        self.patterns
    }

    fn deserialize(&self, _: &str, _: &DeserializationContext<'_>) -> Result<String, SerdesError> {
        Ok(self.tag.to_string())
    }

    fn deserialize_into(
        &self,
        _: &str,
        container: &mut dyn Container<String>,
        _: &DeserializationContext<'_>,
    ) -> Result<(), SerdesError> {
        container.add(self.tag.to_string());
        Ok(())
    }
}

fn resolved_string(requestor: &Requestor, url: &str) -> Option<String> {
    match requestor.request(url).get::<String>().ok()?.outcome() {
        Some(Outcome::Resolved(value)) => value.clone(),
        _ => None,
    }
}

#[test]
fn exact_content_type_beats_wildcard() {
    let (requestor, stub) = setup();
    stub.reply("/json", 200, "application/json; charset=utf-8", "\"body\"");
    stub.reply("/other", 200, "text/html", "<p>body</p>");

    let _exact = requestor
        .register_deserializer(Tagging {
            tag: "exact",
            patterns: &["application/json"],
        })
        .unwrap();
    let _any = requestor
        .register_deserializer(Tagging {
            tag: "any",
            patterns: &["*/*"],
        })
        .unwrap();

    assert_eq!(resolved_string(&requestor, "/json").as_deref(), Some("exact"));
    assert_eq!(resolved_string(&requestor, "/other").as_deref(), Some("any"));
}

#[test]
fn removed_serdes_falls_back_to_builtin() {
    let (requestor, stub) = setup();
    stub.reply("/json", 200, "application/json", "\"body\"");
    let custom = requestor
        .register_deserializer(Tagging {
            tag: "custom",
            patterns: &["application/json"],
        })
        .unwrap();
    assert_eq!(resolved_string(&requestor, "/json").as_deref(), Some("custom"));

    custom.remove();
    assert_eq!(resolved_string(&requestor, "/json").as_deref(), Some("body"));
}

#[test]
fn missing_deserializer_rejects_asynchronously() {
    #[derive(Debug)]
    struct Unregistered;

    let (requestor, stub) = setup();
    stub.reply("/thing", 200, "application/json", "{}");
    let deferred = requestor.request("/thing").get::<Unregistered>().unwrap();
    match deferred.outcome() {
        Some(Outcome::Rejected(RequestError::NoDeserializer { content_type, .. })) => {
            assert_eq!(content_type, "application/json")
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[test]
fn filters_run_in_order_and_see_error_responses() {
    let (requestor, stub) = setup();
    stub.reply("/failure", 404, "text/plain", "");

    let _first = requestor.register_request_filter(|r: &mut HttpRequest| {
        r.headers.set(Header::simple("X-Trace", "first"))
    });
    let _second = requestor.register_request_filter(|r: &mut HttpRequest| {
        let previous = r.headers.value("X-Trace").unwrap_or_default();
        r.headers.set(Header::simple("X-Trace", &format!("{previous},second")))
    });
    let _recover = requestor.register_response_filter(|r: &mut HttpResponse| {
        if r.status == 404 {
            r.status = 200;
            r.body = "recovered".to_string();
        }
    });

    let value = resolved_string(&requestor, "/failure");
    assert_eq!(value.as_deref(), Some("recovered"));
    assert_eq!(
        stub.requests()[0].headers.value("X-Trace").as_deref(),
        Some("first,second")
    );
}

#[test]
fn filter_registered_in_flight_does_not_affect_that_request() {
    let (requestor, stub) = setup();
    stub.reply("/slow", 200, "text/plain", "original");
    stub.hold();

    let deferred = requestor.request("/slow").get::<String>().unwrap();
    assert!(deferred.is_pending());

    let _late = requestor.register_response_filter(|r: &mut HttpResponse| {
        r.body = "filtered".to_string();
    });
    stub.release(&[]);

    match deferred.outcome() {
        Some(Outcome::Resolved(Some(body))) => assert_eq!(body, "original"),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(resolved_string(&requestor, "/slow").as_deref(), Some("filtered"));
}

#[test]
fn progress_precedes_completion_and_late_observers_fire() {
    let (requestor, stub) = setup();
    stub.reply("/upload", 201, "application/json", "7");
    stub.hold();

    let fractions = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&fractions);
    let deferred = requestor
        .request("/upload")
        .payload(FormData::new().put("file", ["a.txt"]))
        .content_type("application/x-www-form-urlencoded")
        .post::<i64>()
        .unwrap();
    deferred.progress(move |p| sink.lock().push(p.completed_fraction()));

    stub.release(&[
        Progress { loaded: 5, total: Some(10) },
        Progress { loaded: 10, total: Some(10) },
    ]);
    assert_eq!(*fractions.lock(), vec![Some(0.5), Some(1.0)]);
    assert!(deferred.notify(Progress { loaded: 10, total: Some(10) }).is_err());

    let late = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&late);
    deferred.done(move |v| *slot.lock() = v.copied());
    assert_eq!(*late.lock(), Some(7));

    assert_eq!(stub.requests()[0].body.as_deref(), Some("file=a.txt"));
}

#[test]
fn transport_error_rejects_without_response_filters() {
    let (requestor, stub) = setup();
    stub.fail("/down", TransportError::Connect("connection refused".to_string()));
    let (filtered, filter_count) = counter();
    let _filter = requestor.register_response_filter(move |_: &mut HttpResponse| {
        filtered.fetch_add(1, Ordering::SeqCst);
    });

    let deferred = requestor.request("/down").get::<String>().unwrap();
    match deferred.outcome() {
        Some(Outcome::Rejected(err)) => {
            assert!(err.is_transport());
            assert!(err.status().is_none());
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(filter_count.load(Ordering::SeqCst), 0);
}

#[test]
fn timeout_is_handled_like_a_connection_failure() {
    let (requestor, stub) = setup();
    stub.fail("/slow-upstream", TransportError::Timeout(Duration::from_millis(250)));
    let (filtered, filter_count) = counter();
    let _filter = requestor.register_response_filter(move |_: &mut HttpResponse| {
        filtered.fetch_add(1, Ordering::SeqCst);
    });

    let deferred = requestor
        .request("/slow-upstream")
        .timeout(Duration::from_millis(250))
        .get::<String>()
        .unwrap();
    match deferred.outcome() {
        Some(Outcome::Rejected(err @ RequestError::Transport(TransportError::Timeout(after)))) => {
            assert!(err.is_transport());
            assert_eq!(*after, Duration::from_millis(250));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(filter_count.load(Ordering::SeqCst), 0);
    assert_eq!(stub.requests()[0].timeout, Some(Duration::from_millis(250)));
}

#[test]
fn uri_builder_target_with_matrix_and_query() {
    let (requestor, stub) = setup();
    let uri = UriBuilder::new()
        .path("/server")
        .segment("books")
        .unwrap()
        .matrix_param("v", ["1"])
        .unwrap()
        .query_param("q", ["x"])
        .unwrap();
    stub.reply("/server/books;v=1?q=x", 200, "application/json", "[]");

    let deferred = requestor
        .request_to(uri)
        .send_collection::<String, Vec<String>>(HttpMethod::Get)
        .unwrap();
    match deferred.outcome() {
        Some(Outcome::Resolved(Some(items))) => assert!(items.is_empty()),
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[test]
fn empty_success_body_resolves_with_none() {
    let (requestor, stub) = setup();
    stub.reply("/server/books/2", 204, "application/json", "");
    let deferred = requestor
        .request("/server/books/2")
        .payload(serde_json::json!({"title": "Emma"}))
        .put::<serde_json::Value>()
        .unwrap();
    assert!(matches!(deferred.outcome(), Some(Outcome::Resolved(None))));
    assert_eq!(stub.requests()[0].body.as_deref(), Some(r#"{"title":"Emma"}"#));
}
