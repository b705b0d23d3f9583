pub mod cache;
pub mod db;
pub mod error;
pub mod models;
pub mod report;
pub mod service;
pub mod stats;
pub mod store;
pub mod summary;
