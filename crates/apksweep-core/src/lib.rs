pub mod config;
pub mod logging;

// Core modules
pub mod fetch;
pub mod http;
pub mod identity;
pub mod jitter;
pub mod pipeline;
pub mod probe;
pub mod proxy;
pub mod retry;
pub mod scheduler;
pub mod signature;
pub mod storage;
pub mod target;
