//! Hidden brick-breaker, opened with the Konami code.

mod leaderboard;
mod overlay;
mod physics;

pub use leaderboard::{Entry, LEADERBOARD_SIZE, Leaderboard};
pub use overlay::{BreakoutOverlay, KonamiDetector};
pub use physics::{Ball, Breakout, Brick, Capsule, CapsuleKind, Phase};

/// Seed for the game's RNG from the wall clock.
pub fn clock_seed() -> u64 {
    #[cfg(target_arch = "wasm32")]
    {
        js_sys::Date::now() as u64
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0x5eed)
    }
}
