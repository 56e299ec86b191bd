pub mod config;
pub mod database;
pub mod gateway;
pub mod http;
pub mod registry;
