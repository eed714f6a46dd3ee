// src/services/mod.rs

pub mod comments;
pub mod counters;
pub mod hashtags;
pub mod posts;
pub mod tree;

pub use comments::CommentRepository;
pub use counters::CounterStore;
pub use hashtags::HashtagIndexer;
pub use posts::PostService;
pub use tree::TreeMaterializer;
