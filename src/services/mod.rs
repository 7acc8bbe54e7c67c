pub mod estimator;
pub mod loader;
pub mod monitor;
pub mod platform;
pub mod pool;
pub mod processor;
pub mod queue;
