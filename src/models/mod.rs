// src/models/mod.rs

pub mod filters;
pub mod image;
pub mod post;
