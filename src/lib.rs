//! Dyno Queue
//!
//! A Postgres-backed job queue drained by an elastic pool of stateless
//! workers. The monitor samples throughput over two windows to estimate
//! completion and scales the worker process group to zero once the queue
//! is empty.

pub mod app_state;
pub mod cli;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
pub mod telemetry;
