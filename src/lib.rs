pub mod aws_clients;
pub mod client;
pub mod config;
pub mod domain;
pub mod errors;
pub mod gateway;
pub mod handlers;
pub mod memory;
pub mod models;
pub mod photo;
pub mod rate_limit;
pub mod repositories;
pub mod routes;
pub mod startup;
pub mod state;
pub mod storage;

#[cfg(test)]
mod test_support;

pub use errors::AppError;
pub use routes::{create_router, HttpSettings};
pub use state::AppState;
