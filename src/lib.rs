// src/lib.rs

//! Comment service library
//!
//! Storage facade over SQLite, object stores and DynamoDB, plus the known-post registry
//! and the crawler that keeps it filled.

pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod registry;
pub mod services;
pub mod storage;
pub mod utils;
