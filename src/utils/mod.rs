// src/utils/mod.rs

pub mod html;
pub mod uploads;
pub mod validation;
