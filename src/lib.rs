pub mod checkpoint;
pub mod config;
pub mod contexts;
pub mod data;
pub mod error;
pub mod registries;
pub mod services;
