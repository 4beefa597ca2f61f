pub mod api;
pub mod clients;
pub mod config;
pub mod error;
pub mod models;
pub mod renderer;
pub mod traits;
pub mod utils;
pub mod worker;
