// src/models/mod.rs

pub mod comment;
pub mod hashtag;
pub mod metric;
pub mod post;
