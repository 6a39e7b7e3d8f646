//! devicelog - environment-aware application logging with rotation and a durable error buffer
//!
//! This library provides the logging engine plus the storage seams it runs on.

pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod storage;
