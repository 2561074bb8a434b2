pub mod cleanup;
pub mod config;
pub mod relaunch;
pub mod remote;
pub mod session;
pub mod update;

pub use cleanup::Cleanup;
pub use config::Config;
pub use session::{Phase, UpdateSession};
