pub mod configuration;
pub mod domain;
pub mod rate_limit;
pub mod relay_client;
pub mod routes;
pub mod startup;
pub mod telemetry;
pub mod waitlist_store;
