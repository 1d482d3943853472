//! Built-in callbacks.
//!
//! - [`LoggingCallback`] logs every correlated request
//! - [`ChannelCallback`] forwards correlated records into an in-process pipeline

mod channel;
mod logging;

pub use channel::ChannelCallback;
pub use logging::LoggingCallback;
