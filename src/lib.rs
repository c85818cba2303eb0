pub mod audit;
pub mod auth;
pub mod clients;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod services;
pub mod store;

#[cfg(test)]
pub mod testing;
