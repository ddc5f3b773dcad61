pub mod aggregate;
pub mod api;
pub mod cli;
pub mod emitter;
pub mod error;
pub mod limiters;
pub mod notify;
pub mod relay;
pub mod settings;
pub mod subscribers;
pub mod transport;
pub mod webhook;
