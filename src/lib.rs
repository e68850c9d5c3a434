pub mod auth;
pub mod capture;
pub mod config;
pub mod error;
pub mod extraction;
pub mod jobs;
pub mod media;
pub mod models;
pub mod plate;
pub mod recognizer;
pub mod routes;
pub mod state;
pub mod store;
pub mod wizard;
pub mod workers;

pub use workers::{default_handlers, Worker};
