//! Relay application settings
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use crate::config_error;
use crate::error::Result;

pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const STANDARD_PORT_HTTP: u16 = 8081;
pub const DEFAULT_PORT_HTTP: &str = "8081";
pub const DEFAULT_RATE_LIMIT_WINDOW_SECONDS: &str = "5";
pub const DEFAULT_RATE_LIMIT_SWEEP_SECONDS: &str = "60";
pub const DEFAULT_EMIT_INTERVAL_SECONDS: &str = "1";
pub const DEFAULT_EMIT_COOLDOWN_SECONDS: &str = "5";
pub const DEFAULT_EMIT_DESTINATION: &str = "127.0.0.1:9999";
pub const DEFAULT_SUBSCRIBER_BUFFER: &str = "64";
pub const DEFAULT_HISTORY_SIZE: &str = "50";
pub const DEFAULT_PUSH_API_URL: &str = "https://api.line.me/v2/bot/message/push";
pub const DEFAULT_RATE_LIMIT_NOTICE: &str =
    "Too many messages. Please wait {window} seconds before sending again.";

/// Per-sender cooldown settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RateLimitSettings {
    pub window_seconds: u32,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self { window_seconds: 5 }
    }
}

impl RateLimitSettings {
    pub fn window(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::from(self.window_seconds))
    }
}

/// Whether rate-limited events still count toward the aggregate
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CountingPolicy {
    #[default]
    Always,
    AcceptedOnly,
}

impl std::fmt::Display for CountingPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CountingPolicy::Always => write!(f, "always"),
            CountingPolicy::AcceptedOnly => write!(f, "accepted-only"),
        }
    }
}

impl std::str::FromStr for CountingPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "always" => Ok(CountingPolicy::Always),
            "accepted-only" | "accepted_only" => Ok(CountingPolicy::AcceptedOnly),
            _ => Err(format!("Invalid counting policy: {}", s)),
        }
    }
}

/// Closed, ordered set of single-character keys
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Vocabulary {
    keys: Vec<char>,
}

impl Vocabulary {
    /// Parse a vocabulary from a string of characters, e.g. `"xkh"`.
    /// Characters are lower-cased; whitespace and commas are separators.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut keys: Vec<char> = Vec::new();
        for c in raw.chars().filter(|c| !c.is_whitespace() && *c != ',') {
            let mut lowered = c.to_lowercase();
            let key = match (lowered.next(), lowered.next()) {
                (Some(key), None) => key,
                _ => return Err(config_error!("Vocabulary key '{}' has no single-character lower case", c)),
            };
            if keys.contains(&key) {
                return Err(config_error!("Duplicate vocabulary key '{}'", key));
            }
            keys.push(key);
        }
        if keys.is_empty() {
            return Err(config_error!("Vocabulary must contain at least one key"));
        }
        Ok(Self { keys })
    }

    pub fn keys(&self) -> &[char] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Slot of a raw text in the vocabulary: the text must be exactly one
    /// character whose lower case is a vocabulary key.
    pub fn slot_for(&self, text: &str) -> Option<usize> {
        let mut chars = text.chars();
        let c = chars.next()?;
        if chars.next().is_some() {
            return None;
        }
        let mut lowered = c.to_lowercase();
        let key = match (lowered.next(), lowered.next()) {
            (Some(key), None) => key,
            _ => return None,
        };
        self.keys.iter().position(|k| *k == key)
    }
}

/// How the aggregate store keys its counters
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum AggregateMode {
    #[default]
    FreeForm,
    Vocabulary(Vocabulary),
}

impl std::fmt::Display for AggregateMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AggregateMode::FreeForm => write!(f, "free-form"),
            AggregateMode::Vocabulary(v) => {
                write!(f, "vocabulary[{}]", v.keys().iter().collect::<String>())
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct EmitterSettings {
    // Cadence of snapshot emission
    pub interval: Duration,
    // Wait after a failed reconnect before the next attempt
    pub cooldown: Duration,
    // host:port of the datagram sink
    pub destination: String,
    pub skip_empty_snapshots: bool,
    // Merge an unsent snapshot back into the store instead of dropping it
    pub retain_failed_snapshots: bool,
}

impl Default for EmitterSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            cooldown: Duration::from_secs(5),
            destination: DEFAULT_EMIT_DESTINATION.to_string(),
            skip_empty_snapshots: true,
            retain_failed_snapshots: true,
        }
    }
}

#[derive(Clone, Debug)]
pub struct NotifierSettings {
    pub push_api_url: String,
    pub channel_access_token: Option<String>,
    pub notice_template: String,
}

impl Default for NotifierSettings {
    fn default() -> Self {
        Self {
            push_api_url: DEFAULT_PUSH_API_URL.to_string(),
            channel_access_token: None,
            notice_template: DEFAULT_RATE_LIMIT_NOTICE.to_string(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Settings {
    // Server listen address
    pub listen_address: String,

    // HTTP API listen port
    pub listen_port: u16,

    pub rate_limit: RateLimitSettings,

    // Cadence of the expired-sender sweeper
    pub rate_limit_sweep_interval: Duration,

    pub emitter: EmitterSettings,

    pub aggregate_mode: AggregateMode,

    pub counting_policy: CountingPolicy,

    // Per-subscriber queue depth
    pub subscriber_buffer: usize,

    // Recent broadcast messages retained for the viewer
    pub history_size: usize,

    pub notifier: NotifierSettings,

    pub log_json: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0".to_string(),
            listen_port: STANDARD_PORT_HTTP,
            rate_limit: RateLimitSettings::default(),
            rate_limit_sweep_interval: Duration::from_secs(60),
            emitter: EmitterSettings::default(),
            aggregate_mode: AggregateMode::FreeForm,
            counting_policy: CountingPolicy::Always,
            subscriber_buffer: 64,
            history_size: 50,
            notifier: NotifierSettings::default(),
            log_json: false,
        }
    }
}

impl Settings {
    pub fn socket_address(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self.listen_address.parse()?;
        Ok(SocketAddr::from((ip, self.listen_port)))
    }

    /// The templated notice sent to a rate-limited sender
    pub fn rate_limit_notice(&self) -> String {
        self.notifier
            .notice_template
            .replace("{window}", &self.rate_limit.window_seconds.to_string())
    }

    pub fn validate(&self) -> Result<()> {
        if self.rate_limit.window_seconds == 0 {
            return Err(config_error!("Rate limit window must be greater than 0"));
        }
        if self.rate_limit_sweep_interval.is_zero() {
            return Err(config_error!("Rate limit sweep interval must be greater than 0"));
        }
        if self.emitter.interval.is_zero() {
            return Err(config_error!("Emit interval must be greater than 0"));
        }
        if self.emitter.cooldown.is_zero() {
            return Err(config_error!("Emit cooldown must be greater than 0"));
        }
        match self.emitter.destination.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {}
            _ => {
                return Err(config_error!(
                    "Emit destination must be host:port, got '{}'",
                    self.emitter.destination
                ))
            }
        }
        if self.subscriber_buffer == 0 {
            return Err(config_error!("Subscriber buffer must be at least 1"));
        }
        Ok(())
    }
}
