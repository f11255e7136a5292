//! Library exports for the foodly session layer, shared between the gateway
//! binary and tests.

pub mod analytics;
pub mod callback;
pub mod config;
pub mod error;
pub mod guards;
pub mod models;
pub mod profiles;
pub mod providers;
pub mod routes;
pub mod session;
pub mod startup;
pub mod state;
pub mod utils;
pub mod validation;
