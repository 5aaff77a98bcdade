// src/handlers/mod.rs

pub mod health;
pub mod images;
pub mod posts;
