use std::{cell::RefCell, future::Future, rc::Rc, time::Duration};

use futures::future::LocalBoxFuture;
use log::debug;
use tokio::task::JoinHandle;

type Action<A> = Rc<dyn Fn(A) -> LocalBoxFuture<'static, ()>>;

struct DebounceState<A> {
    delay: Duration,
    action: Action<A>,
    timer: Option<JoinHandle<()>>,
    latest: Option<A>,
}

/// Collapses bursts of calls into one trailing run of an async action.
///
/// Every [`call`](Debouncer::call) replaces the pending arguments and restarts
/// the timer; when the timer runs out the action is spawned with the latest
/// arguments. A run that already started is never cancelled, only the pending
/// timer is.
///
/// Timers and runs are spawned with [`tokio::task::spawn_local`], so calls
/// must happen inside a [`tokio::task::LocalSet`].
pub struct Debouncer<A> {
    state: Rc<RefCell<DebounceState<A>>>,
}

impl<A: 'static> Debouncer<A> {
    pub fn new<F, Fut>(delay: Duration, action: F) -> Self
    where
        F: Fn(A) -> Fut + 'static,
        Fut: Future<Output = ()> + 'static,
    {
        let action: Action<A> =
            Rc::new(move |args| -> LocalBoxFuture<'static, ()> { Box::pin(action(args)) });
        Self {
            state: Rc::new(RefCell::new(DebounceState {
                delay,
                action,
                timer: None,
                latest: None,
            })),
        }
    }

    pub fn delay(&self) -> Duration {
        self.state.borrow().delay
    }

    pub fn call(&self, args: A) {
        let mut state = self.state.borrow_mut();
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        state.latest = Some(args);

        let delay = state.delay;
        let shared = Rc::clone(&self.state);
        state.timer = Some(tokio::task::spawn_local(async move {
            tokio::time::sleep(delay).await;
            let (action, args) = {
                let mut state = shared.borrow_mut();
                state.timer = None;
                (Rc::clone(&state.action), state.latest.take())
            };
            // Detached, so a later call can't abort it
            if let Some(args) = args {
                tokio::task::spawn_local(action(args));
            }
        }));
    }

    pub fn is_pending(&self) -> bool {
        self.state.borrow().latest.is_some()
    }

    pub fn cancel(&self) {
        let mut state = self.state.borrow_mut();
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        if state.latest.take().is_some() {
            debug!("Pending debounced call dropped");
        }
    }

    pub fn is_pending_where<P: FnOnce(&A) -> bool>(&self, predicate: P) -> bool {
        self.state.borrow().latest.as_ref().is_some_and(predicate)
    }

    /// Cancels the pending call only if its arguments match.
    pub fn cancel_where<P: FnOnce(&A) -> bool>(&self, predicate: P) -> bool {
        let matches = self.is_pending_where(predicate);
        if matches {
            self.cancel();
        }
        matches
    }

    /// Runs the pending call now, if any, and waits for it to finish.
    pub async fn flush(&self) {
        let (action, args) = {
            let mut state = self.state.borrow_mut();
            if let Some(timer) = state.timer.take() {
                timer.abort();
            }
            (Rc::clone(&state.action), state.latest.take())
        };
        if let Some(args) = args {
            action(args).await;
        }
    }
}

impl<A> Drop for Debouncer<A> {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.try_borrow_mut() {
            if let Some(timer) = state.timer.take() {
                timer.abort();
            }
        }
    }
}
