use std::cell::Cell;
use std::rc::Rc;

use super::store::AuthStore;
use crate::cancel::{CancelOnDrop, CancelToken};
use crate::router::Route;
use crate::task;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardState {
    /// Hydration has not finished; show a neutral placeholder.
    Checking,
    Authenticated,
    Redirecting { to: Route },
}

/// Gate in front of a protected page.
///
/// A guard is created when the page mounts and fires exactly one hydration
/// through [`AuthStore::hydrate`]; it never fetches again however often it is
/// polled, so a backend that keeps answering 401 cannot cause a fetch loop.
#[derive(Debug)]
pub struct RouteGuard {
    origin: Route,
    state: GuardState,
    attempted: bool,
    settled: Rc<Cell<bool>>,
    mounted: CancelOnDrop,
}

impl RouteGuard {
    pub fn mount(origin: Route) -> Self {
        Self {
            origin,
            state: GuardState::Checking,
            attempted: false,
            settled: Rc::new(Cell::new(false)),
            mounted: CancelToken::new().drop_guard(),
        }
    }

    pub fn origin(&self) -> &Route {
        &self.origin
    }

    pub fn state(&self) -> &GuardState {
        &self.state
    }

    pub fn hydration_started(&self) -> bool {
        self.attempted
    }

    /// Advances the guard. Call once per frame while the page is shown.
    pub fn poll(&mut self, store: &AuthStore) -> &GuardState {
        if !self.attempted {
            self.attempted = true;
            let hydration = store.hydrate();
            let settled = Rc::clone(&self.settled);
            let mounted = self.mounted.token().clone();
            task::spawn_local(async move {
                hydration.await;
                if !mounted.is_cancelled() {
                    settled.set(true);
                }
            });
        }

        match self.state {
            GuardState::Checking if self.settled.get() => {
                debug_assert!(store.is_resolved(), "hydration settled but store unresolved");
                self.state = self.decide(store);
            }
            GuardState::Authenticated if !store.is_authenticated() => {
                log::debug!("session lost while on {}", self.origin);
                self.state = self.redirect();
            }
            _ => {}
        }
        &self.state
    }

    fn decide(&self, store: &AuthStore) -> GuardState {
        if store.is_authenticated() {
            GuardState::Authenticated
        } else {
            log::debug!("{} requires sign-in", self.origin);
            self.redirect()
        }
    }

    fn redirect(&self) -> GuardState {
        GuardState::Redirecting {
            to: Route::sign_in_returning_to(&self.origin),
        }
    }
}
