//! All Paths are recorded here for use throughout this codebase
pub mod base {
    pub const ROOT: &str = "/";
    pub const HEALTH: &str = "/health";
    pub const ABOUT: &str = "/about";
}

pub mod intake {
    pub const WEBHOOK: &str = "/webhook";
    // path the first deployments posted to
    pub const WEBHOOK_LEGACY: &str = "/test";
    pub const MESSAGE: &str = "/api/message";
}

pub mod stream {
    pub const EVENTS: &str = "/events";
    pub const EVENTS_LEGACY: &str = "/sse";
}

pub const MESSAGES: &str = "/api/messages";
pub const STATS: &str = "/stats";
pub const EXPIRE_KEYS: &str = "/expire-keys";
