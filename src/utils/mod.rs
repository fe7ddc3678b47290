// src/utils/mod.rs

pub mod checksum;
pub mod html;
pub mod stats;
