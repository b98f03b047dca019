//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `SubscriptionMultiplexer`: Accounts requests, fans out replies, restores on reconnect
//! - `MultiplexerService`: Async loop pumping transport events into the multiplexer

mod multiplexer;
mod runner;

pub use multiplexer::SubscriptionMultiplexer;
pub use runner::MultiplexerService;
