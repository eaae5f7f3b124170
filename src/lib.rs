pub mod breaker;
pub mod cache;
pub mod config;
pub mod gateway;
pub mod rate_limiter;
pub mod single_flight;
