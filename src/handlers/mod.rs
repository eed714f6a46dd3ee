// src/handlers/mod.rs

pub mod community;
pub mod interaction;
pub mod thread;
