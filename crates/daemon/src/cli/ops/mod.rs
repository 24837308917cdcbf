pub mod daemon;
pub mod health;
pub mod volume;

pub use daemon::Daemon;
pub use health::Health;
pub use volume::Volume;
