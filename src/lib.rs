//! Sung-performance comparison: decode two recordings, extract pitch and
//! energy contours, score their differences and publish the outcome.

pub mod audio;
pub mod comparison;
pub mod config;
pub mod services;
pub mod types;
