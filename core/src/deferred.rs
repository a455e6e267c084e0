//! Promise-like handle for an in-flight request.
//!
//! # Design
//! A `Deferred` starts pending and settles exactly once, either resolved
//! with an optional value or rejected with a `RequestError`. The settlement
//! is stored in a `OnceLock`, which makes the transition atomic and lets
//! observers borrow the outcome without holding any lock.
//!
//! Observer lists live behind a `parking_lot::Mutex`. Settling takes the
//! lists out under the lock and runs them after releasing it, so an
//! observer may register further observers, or try to settle the same
//! deferred again (getting `AlreadySettled`), without deadlocking.
//! Observers registered after settlement run immediately on the calling
//! thread.
//!
//! Status-scoped observers (`on`) intercept a settlement that carries a
//! response: the most specific code prefix matching the status runs instead
//! of the done/fail observers. `always` observers run in every case.
//!
//! Value delivery is claimed once. Settlement claims it for the winning
//! scoped observer, or for done/fail when any were registered. After
//! settlement the first late registration that can deliver claims it: a
//! matching `on` takes over only if nothing has been delivered yet, and
//! late done/fail are skipped once an `on` has taken over. A transport
//! that answers inside `send` therefore behaves the same whether the
//! observers were registered before or after the response.
//! A panic in any observer is caught and logged; the remaining observers
//! still run.

use std::fmt;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use tracing::{error, trace, warn};

use crate::error::RequestError;
use crate::http::{HttpResponse, Progress};

/// Lifecycle state of a deferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Pending,
    Resolved,
    Rejected,
}

/// Terminal result of a deferred.
#[derive(Debug, Clone)]
pub enum Outcome<T> {
    /// `None` when the response carried no body.
    Resolved(Option<T>),
    Rejected(RequestError),
}

impl<T> Outcome<T> {
    pub fn state(&self) -> State {
        match self {
            Outcome::Resolved(_) => State::Resolved,
            Outcome::Rejected(_) => State::Rejected,
        }
    }
}

/// View of a settled deferred handed to `always` and `on` observers.
pub struct Completion<'a, T> {
    outcome: &'a Outcome<T>,
    response: Option<&'a HttpResponse>,
}

impl<'a, T> Completion<'a, T> {
    pub fn state(&self) -> State {
        self.outcome.state()
    }

    pub fn outcome(&self) -> &'a Outcome<T> {
        self.outcome
    }

    pub fn value(&self) -> Option<&'a T> {
        match self.outcome {
            Outcome::Resolved(value) => value.as_ref(),
            Outcome::Rejected(_) => None,
        }
    }

    pub fn error(&self) -> Option<&'a RequestError> {
        match self.outcome {
            Outcome::Resolved(_) => None,
            Outcome::Rejected(err) => Some(err),
        }
    }

    pub fn response(&self) -> Option<&'a HttpResponse> {
        self.response
    }
}

type DoneFn<T> = Box<dyn FnOnce(Option<&T>) + Send>;
type FailFn = Box<dyn FnOnce(&RequestError) + Send>;
type AlwaysFn<T> = Box<dyn for<'a> FnOnce(&Completion<'a, T>) + Send>;
type ProgressFn = Arc<dyn Fn(&Progress) + Send + Sync>;

struct Settlement<T> {
    outcome: Outcome<T>,
    response: Option<HttpResponse>,
}

impl<T> Settlement<T> {
    fn completion(&self) -> Completion<'_, T> {
        Completion {
            outcome: &self.outcome,
            response: self.response.as_ref(),
        }
    }
}

struct Observers<T> {
    done: Vec<DoneFn<T>>,
    fail: Vec<FailFn>,
    always: Vec<AlwaysFn<T>>,
    progress: Vec<ProgressFn>,
    scoped: Vec<(u16, AlwaysFn<T>)>,
    /// Set once settlement has taken the lists.
    drained: bool,
    delivery: Delivery,
}

/// Who received the settled value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    Unclaimed,
    Plain,
    Scoped(u16),
}

impl Delivery {
    /// Claim for a done/fail observer; refused once an `on` took over.
    fn claim_plain(&mut self) -> bool {
        match self {
            Delivery::Scoped(_) => false,
            _ => {
                *self = Delivery::Plain;
                true
            }
        }
    }

    /// Claim for a late `on` observer; only the first claimant wins.
    fn claim_scoped(&mut self, code: u16) -> bool {
        match self {
            Delivery::Unclaimed => {
                *self = Delivery::Scoped(code);
                true
            }
            _ => false,
        }
    }
}

impl<T> Default for Observers<T> {
    fn default() -> Self {
        Self {
            done: Vec::new(),
            fail: Vec::new(),
            always: Vec::new(),
            progress: Vec::new(),
            scoped: Vec::new(),
            drained: false,
            delivery: Delivery::Unclaimed,
        }
    }
}

struct Shared<T> {
    settled: OnceLock<Settlement<T>>,
    observers: Mutex<Observers<T>>,
}

/// Handle to the eventual outcome of a request.
///
/// Cloning yields another handle to the same deferred.
pub struct Deferred<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Send + Sync + 'static> Default for Deferred<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.shared.settled.get() {
            Some(settlement) => settlement.outcome.state(),
            None => State::Pending,
        };
        f.debug_struct("Deferred").field("state", &state).finish()
    }
}

/// Number of decimal digits in a status code prefix.
fn digits(code: u16) -> usize {
    code.to_string().len()
}

/// Whether the scoped code `code` covers `status`: `2` covers 200-299,
/// `20` covers 200-209, `204` covers exactly 204.
pub(crate) fn code_matches(code: u16, status: u16) -> bool {
    status.to_string().starts_with(&code.to_string())
}

fn run_observer(kind: &'static str, observer: impl FnOnce()) {
    if panic::catch_unwind(AssertUnwindSafe(observer)).is_err() {
        error!(observer = kind, "observer panicked; continuing with remaining observers");
    }
}

impl<T: Send + Sync + 'static> Deferred<T> {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                settled: OnceLock::new(),
                observers: Mutex::new(Observers::default()),
            }),
        }
    }

    pub fn state(&self) -> State {
        match self.shared.settled.get() {
            Some(settlement) => settlement.outcome.state(),
            None => State::Pending,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.state() == State::Pending
    }

    pub fn is_resolved(&self) -> bool {
        self.state() == State::Resolved
    }

    pub fn is_rejected(&self) -> bool {
        self.state() == State::Rejected
    }

    /// Terminal outcome, once settled.
    pub fn outcome(&self) -> Option<&Outcome<T>> {
        self.shared.settled.get().map(|s| &s.outcome)
    }

    /// Response the deferred settled with, if it carried one.
    pub fn response(&self) -> Option<&HttpResponse> {
        self.shared.settled.get().and_then(|s| s.response.as_ref())
    }

    pub fn resolve(&self, value: Option<T>) -> Result<(), RequestError> {
        self.settle(Outcome::Resolved(value), None)
    }

    pub fn reject(&self, err: RequestError) -> Result<(), RequestError> {
        self.settle(Outcome::Rejected(err), None)
    }

    /// Settle with `outcome`, attaching the response it came from.
    ///
    /// Fails with `AlreadySettled` if the deferred is no longer pending; in
    /// that case no observer runs.
    pub fn settle(&self, outcome: Outcome<T>, response: Option<HttpResponse>) -> Result<(), RequestError> {
        let status = response.as_ref().map(|r| r.status);
        let resolved = matches!(outcome, Outcome::Resolved(_));
        let (scoped, done, fail, always) = {
            let mut observers = self.shared.observers.lock();
            if self.shared.settled.set(Settlement { outcome, response }).is_err() {
                warn!("attempt to settle a deferred that is no longer pending");
                return Err(RequestError::AlreadySettled);
            }
            observers.drained = true;
            observers.progress.clear();

            let mut scoped = mem::take(&mut observers.scoped);
            let winner = status.and_then(|status| {
                let index = scoped
                    .iter()
                    .enumerate()
                    .filter(|(_, (code, _))| code_matches(*code, status))
                    .max_by_key(|(_, (code, _))| digits(*code))
                    .map(|(index, _)| index)?;
                Some(scoped.swap_remove(index))
            });
            let plain = if resolved {
                !observers.done.is_empty()
            } else {
                !observers.fail.is_empty()
            };
            observers.delivery = match &winner {
                Some((code, _)) => Delivery::Scoped(*code),
                None if plain => Delivery::Plain,
                None => Delivery::Unclaimed,
            };

            (
                winner,
                mem::take(&mut observers.done),
                mem::take(&mut observers.fail),
                mem::take(&mut observers.always),
            )
        };

        let Some(settlement) = self.shared.settled.get() else {
            return Ok(());
        };
        let completion = settlement.completion();
        trace!(state = ?completion.state(), status, "deferred settled");

        match scoped {
            Some((_, observer)) => run_observer("on", || observer(&completion)),
            None => match &settlement.outcome {
                Outcome::Resolved(value) => {
                    for observer in done {
                        run_observer("done", || observer(value.as_ref()));
                    }
                }
                Outcome::Rejected(err) => {
                    for observer in fail {
                        run_observer("fail", || observer(err));
                    }
                }
            },
        }
        for observer in always {
            run_observer("always", || observer(&completion));
        }
        Ok(())
    }

    /// Deliver a progress notification to the progress observers.
    ///
    /// Settlement is re-checked before each observer, so no observer starts
    /// after the deferred settled. An observer already running when another
    /// thread settles the deferred is not interrupted.
    pub fn notify(&self, progress: Progress) -> Result<(), RequestError> {
        let observers = {
            let observers = self.shared.observers.lock();
            if observers.drained {
                return Err(RequestError::AlreadySettled);
            }
            observers.progress.clone()
        };
        for observer in observers {
            if self.shared.observers.lock().drained {
                trace!("deferred settled during progress delivery");
                return Err(RequestError::AlreadySettled);
            }
            run_observer("progress", || observer(&progress));
        }
        Ok(())
    }

    /// Observe resolution. Skipped when a status-scoped observer intercepted
    /// the settlement.
    pub fn done(&self, observer: impl FnOnce(Option<&T>) + Send + 'static) -> &Self {
        let mut observers = self.shared.observers.lock();
        if !observers.drained {
            observers.done.push(Box::new(observer));
            return self;
        }
        let Some(Outcome::Resolved(value)) = self.outcome() else {
            return self;
        };
        if !observers.delivery.claim_plain() {
            return self;
        }
        drop(observers);

        run_observer("done", || observer(value.as_ref()));
        self
    }

    /// Observe rejection. Skipped when a status-scoped observer intercepted
    /// the settlement.
    pub fn fail(&self, observer: impl FnOnce(&RequestError) + Send + 'static) -> &Self {
        let mut observers = self.shared.observers.lock();
        if !observers.drained {
            observers.fail.push(Box::new(observer));
            return self;
        }
        let Some(Outcome::Rejected(err)) = self.outcome() else {
            return self;
        };
        if !observers.delivery.claim_plain() {
            return self;
        }
        drop(observers);

        run_observer("fail", || observer(err));
        self
    }

    /// Observe settlement, whatever the outcome.
    pub fn always(&self, observer: impl for<'a> FnOnce(&Completion<'a, T>) + Send + 'static) -> &Self {
        let mut observers = self.shared.observers.lock();
        if !observers.drained {
            observers.always.push(Box::new(observer));
            return self;
        }
        drop(observers);

        if let Some(settlement) = self.shared.settled.get() {
            run_observer("always", || observer(&settlement.completion()));
        }
        self
    }

    pub fn progress(&self, observer: impl Fn(&Progress) + Send + Sync + 'static) -> &Self {
        let mut observers = self.shared.observers.lock();
        if !observers.drained {
            observers.progress.push(Arc::new(observer));
        }
        self
    }

    /// Observe settlements whose response status starts with `code`.
    ///
    /// Only the most specific matching code runs, and it replaces the
    /// done/fail observers for that settlement. Registering the same code
    /// again replaces the earlier observer.
    ///
    /// Registered after settlement, the observer runs only when its code
    /// matches and neither another `on` nor a done/fail observer has
    /// received the outcome yet.
    pub fn on(&self, code: u16, observer: impl for<'a> FnOnce(&Completion<'a, T>) + Send + 'static) -> &Self {
        let mut observers = self.shared.observers.lock();
        if !observers.drained {
            match observers.scoped.iter_mut().find(|(c, _)| *c == code) {
                Some(existing) => existing.1 = Box::new(observer),
                None => observers.scoped.push((code, Box::new(observer))),
            }
            return self;
        }
        let Some(settlement) = self.shared.settled.get() else {
            return self;
        };
        let matches = settlement
            .response
            .as_ref()
            .is_some_and(|r| code_matches(code, r.status));
        if !matches || !observers.delivery.claim_scoped(code) {
            return self;
        }
        drop(observers);

        run_observer("on", || observer(&settlement.completion()));
        self
    }

    /// Whether a scoped observer registered so far would intercept `status`.
    pub(crate) fn intercepts(&self, status: u16) -> bool {
        let observers = self.shared.observers.lock();
        observers.scoped.iter().any(|(code, _)| code_matches(*code, status))
    }

    /// Derived deferred settled with `f` applied to this one's value.
    /// Rejections are forwarded unchanged.
    pub fn map<U, F>(&self, f: F) -> Deferred<U>
    where
        U: Send + Sync + 'static,
        F: FnOnce(Option<&T>) -> Option<U> + Send + 'static,
    {
        let mapped = Deferred::new();
        let target = mapped.clone();
        self.always(move |completion| {
            let outcome = match completion.outcome() {
                Outcome::Resolved(value) => Outcome::Resolved(f(value.as_ref())),
                Outcome::Rejected(err) => Outcome::Rejected(err.clone()),
            };
            // A fresh deferred only settles here.
            let _ = target.settle(outcome, completion.response().cloned());
        });
        mapped
    }

    /// Chain a follow-up deferred produced from this one's value.
    pub fn and_then<U, F>(&self, f: F) -> Deferred<U>
    where
        U: Clone + Send + Sync + 'static,
        F: FnOnce(Option<&T>) -> Deferred<U> + Send + 'static,
    {
        let chained = Deferred::new();
        let target = chained.clone();
        self.always(move |completion| match completion.outcome() {
            Outcome::Resolved(value) => {
                let next = f(value.as_ref());
                next.always(move |inner| {
                    let _ = target.settle(inner.outcome().clone(), inner.response().cloned());
                });
            }
            Outcome::Rejected(err) => {
                let _ = target.settle(Outcome::Rejected(err.clone()), completion.response().cloned());
            }
        });
        chained
    }
}
