pub mod clock;
pub mod config_loader;
pub mod context;
pub mod cortex;
pub mod events;
pub mod intel;
pub mod personality;
pub mod proactive;
pub mod rate_limiter;
pub mod router;
pub mod service;
pub mod speech;
pub mod store;
pub mod voice;
pub mod wake;
