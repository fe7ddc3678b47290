// src/handlers/mod.rs

pub mod dashboard;
pub mod dataset;
pub mod page;
