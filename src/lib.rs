pub mod config;
pub mod contexts;
pub mod data;
pub mod workers;
