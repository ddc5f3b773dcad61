//! CLI for this application
//!
use std::time::Duration;

use crate::error::Result;
use crate::settings;

#[derive(Clone, Debug, clap::Parser)]
#[clap(name = settings::APP_NAME, version = settings::APP_VERSION)]
pub struct Cli {
    // Server listen address
    #[clap(
        long,
        default_value = "0.0.0.0",
        env("CHATRELAY_LISTEN_ADDRESS"),
        help = "IP Address to listen on"
    )]
    pub listen_address: String,

    // HTTP API listen port
    #[clap(
        long,
        default_value = settings::DEFAULT_PORT_HTTP,
        env("CHATRELAY_HTTP_LISTEN_PORT"),
        help = "Port to bind the HTTP server to"
    )]
    pub listen_port: u16,

    // Rate limit settings: cooldown between accepted events per sender
    #[clap(
        long,
        default_value = settings::DEFAULT_RATE_LIMIT_WINDOW_SECONDS,
        env("CHATRELAY_RATE_LIMIT_WINDOW_SECONDS"),
        help = "Seconds a sender must wait between broadcast messages"
    )]
    pub rate_limit_window_seconds: u32,

    #[clap(
        long,
        default_value = settings::DEFAULT_RATE_LIMIT_SWEEP_SECONDS,
        env("CHATRELAY_RATE_LIMIT_SWEEP_SECONDS"),
        help = "Seconds between sweeps of expired sender entries"
    )]
    pub rate_limit_sweep_seconds: u64,

    // Emitter settings
    #[clap(
        long,
        default_value = settings::DEFAULT_EMIT_INTERVAL_SECONDS,
        env("CHATRELAY_EMIT_INTERVAL_SECONDS"),
        help = "Seconds between aggregate snapshots"
    )]
    pub emit_interval_seconds: u64,

    #[clap(
        long,
        default_value = settings::DEFAULT_EMIT_COOLDOWN_SECONDS,
        env("CHATRELAY_EMIT_COOLDOWN_SECONDS"),
        help = "Seconds to wait after a failed reconnect"
    )]
    pub emit_cooldown_seconds: u64,

    #[clap(
        long,
        default_value = settings::DEFAULT_EMIT_DESTINATION,
        env("CHATRELAY_EMIT_DESTINATION"),
        help = "host:port receiving aggregate datagrams"
    )]
    pub emit_destination: String,

    #[clap(
        long,
        default_value_t = true,
        action = clap::ArgAction::Set,
        env("CHATRELAY_SKIP_EMPTY_SNAPSHOTS"),
        help = "Skip sending empty free-form snapshots"
    )]
    pub skip_empty_snapshots: bool,

    #[clap(
        long,
        default_value_t = true,
        action = clap::ArgAction::Set,
        env("CHATRELAY_RETAIN_FAILED_SNAPSHOTS"),
        help = "Merge snapshots that could not be sent back into the aggregate"
    )]
    pub retain_failed_snapshots: bool,

    // Aggregate mode: presence selects fixed-vocabulary mode
    #[clap(
        long,
        env("CHATRELAY_TARGET_VOCABULARY"),
        help = "Ordered single-character keys to count (e.g. 'xkh'). Free-form counting if unset."
    )]
    pub target_vocabulary: Option<String>,

    #[clap(
        long,
        default_value = "always",
        env("CHATRELAY_COUNTING_POLICY"),
        help = "counting-policy: 'always' or 'accepted-only'"
    )]
    pub counting_policy: settings::CountingPolicy,

    #[clap(
        long,
        default_value = settings::DEFAULT_SUBSCRIBER_BUFFER,
        env("CHATRELAY_SUBSCRIBER_BUFFER"),
        help = "Messages queued per subscriber before it is dropped"
    )]
    pub subscriber_buffer: usize,

    #[clap(
        long,
        default_value = settings::DEFAULT_HISTORY_SIZE,
        env("CHATRELAY_HISTORY_SIZE"),
        help = "Recent broadcast messages kept in memory"
    )]
    pub history_size: usize,

    // Notifier settings
    #[clap(
        long,
        default_value = settings::DEFAULT_RATE_LIMIT_NOTICE,
        env("CHATRELAY_RATE_LIMIT_NOTICE"),
        help = "Notice pushed to rate-limited senders; '{window}' is replaced with the window"
    )]
    pub rate_limit_notice: String,

    #[clap(
        long,
        default_value = settings::DEFAULT_PUSH_API_URL,
        env("CHATRELAY_PUSH_API_URL"),
        help = "Push message API endpoint"
    )]
    pub push_api_url: String,

    #[clap(
        long,
        env("CHATRELAY_CHANNEL_ACCESS_TOKEN"),
        hide_env_values = true,
        help = "Channel access token for the push API. Notices are only logged if unset."
    )]
    pub channel_access_token: Option<String>,

    #[clap(long, env("CHATRELAY_LOG_JSON"), help = "Emit JSON log lines")]
    pub log_json: bool,
}

impl Cli {
    pub fn into_settings(self) -> Result<settings::Settings> {
        let aggregate_mode = match self.target_vocabulary.as_deref() {
            Some(raw) => settings::AggregateMode::Vocabulary(settings::Vocabulary::parse(raw)?),
            None => settings::AggregateMode::FreeForm,
        };
        let settings = settings::Settings {
            listen_address: self.listen_address,
            listen_port: self.listen_port,
            rate_limit: settings::RateLimitSettings {
                window_seconds: self.rate_limit_window_seconds,
            },
            rate_limit_sweep_interval: Duration::from_secs(self.rate_limit_sweep_seconds),
            emitter: settings::EmitterSettings {
                interval: Duration::from_secs(self.emit_interval_seconds),
                cooldown: Duration::from_secs(self.emit_cooldown_seconds),
                destination: self.emit_destination,
                skip_empty_snapshots: self.skip_empty_snapshots,
                retain_failed_snapshots: self.retain_failed_snapshots,
            },
            aggregate_mode,
            counting_policy: self.counting_policy,
            subscriber_buffer: self.subscriber_buffer,
            history_size: self.history_size,
            notifier: settings::NotifierSettings {
                push_api_url: self.push_api_url,
                channel_access_token: self.channel_access_token.filter(|t| !t.is_empty()),
                notice_template: self.rate_limit_notice,
            },
            log_json: self.log_json,
        };
        settings.validate()?;
        Ok(settings)
    }
}
