//! Spawning non-`Send` futures on the UI thread.
//!
//! In the browser this is `wasm_bindgen_futures::spawn_local`. Natively the
//! futures sit in a thread-local `LocalPool` that the app drains once per frame
//! through [`pump`].

use std::cell::Cell;
use std::future::Future;

thread_local! {
    static IN_FLIGHT: Cell<usize> = const { Cell::new(0) };
}

pub fn spawn_local<F: Future<Output = ()> + 'static>(f: F) {
    IN_FLIGHT.with(|n| n.set(n.get() + 1));
    platform::spawn(async move {
        f.await;
        IN_FLIGHT.with(|n| n.set(n.get().saturating_sub(1)));
    });
}

/// Spawned futures that have not finished yet. The frame loop keeps
/// repainting while this is non-zero so results get picked up.
pub fn in_flight() -> usize {
    IN_FLIGHT.with(Cell::get)
}

#[cfg(target_arch = "wasm32")]
mod platform {
    use std::future::Future;

    pub fn spawn<F: Future<Output = ()> + 'static>(f: F) {
        wasm_bindgen_futures::spawn_local(f);
    }

    pub fn pump() {}
}

#[cfg(not(target_arch = "wasm32"))]
mod platform {
    use std::cell::RefCell;
    use std::future::Future;

    use futures::executor::{LocalPool, LocalSpawner};
    use futures::task::LocalSpawnExt;

    thread_local! {
        static POOL: RefCell<LocalPool> = RefCell::new(LocalPool::new());
        static SPAWNER: LocalSpawner = POOL.with(|pool| pool.borrow().spawner());
    }

    pub fn spawn<F: Future<Output = ()> + 'static>(f: F) {
        SPAWNER.with(|spawner| {
            if let Err(e) = spawner.spawn_local(f) {
                log::error!("could not spawn task: {e}");
            }
        });
    }

    /// Runs every spawned task until none can make progress.
    pub fn pump() {
        POOL.with(|pool| {
            // Re-entrant pumps (a task calling `pump`) are skipped.
            if let Ok(mut pool) = pool.try_borrow_mut() {
                pool.run_until_stalled();
            }
        });
    }
}

/// Drives native tasks; a no-op in the browser, where the event loop does it.
pub fn pump() {
    platform::pump();
}
