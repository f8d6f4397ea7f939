pub mod aggregator;
pub mod clock;
pub mod config;
pub mod fetch;
pub mod format;
pub mod geo;
pub mod observer;
pub mod record;
pub mod sample;
pub mod session;
pub mod source;
pub mod store;
