pub mod config;
pub mod controller;
pub mod discovery;
pub mod error;
pub mod gateway_client;
pub mod invoker;
pub mod log_setup;
pub mod lookup_builder;
pub mod metrics;
pub mod observer;
pub mod topic_map;
pub mod types;
