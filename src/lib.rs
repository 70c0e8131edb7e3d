// Library surface for headless/integration tests and reuse.
// Keep this lean to avoid coupling to bin-only types in main.rs.
pub mod app_dirs;
pub mod clock;
pub mod config;
pub mod game;
pub mod logging;
pub mod runtime;
pub mod scheduler;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, ConfigError, Timings};
pub use game::{Game, GameState, Phase, Snapshot, LIGHT_COUNT};
