//! Configuration Module
//!
//! Configuration loading for the subscription multiplexer.

mod settings;

pub use settings::{ChannelSettings, ConfigError, MultiplexerConfig, MultiplexerSettings};
