// src/services/mod.rs

pub mod chart;
pub mod dataset_cache;
pub mod pipeline;
pub mod sync;
