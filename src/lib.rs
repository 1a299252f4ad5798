pub mod api;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod metrics;
pub mod policy;
pub mod registry;
pub mod simulator;
pub mod state;
pub mod world;
