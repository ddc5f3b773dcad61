pub mod cooldown;
pub use cooldown::{spawn_expiry_sweeper, Decision, RateLimiter};
