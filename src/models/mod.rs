// src/models/mod.rs

pub mod panel;
pub mod params;
pub mod record;
