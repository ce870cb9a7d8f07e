//! The posts REST service and the queries built on it.

pub mod client;
pub mod queries;
pub mod types;

pub use client::PostClient;
pub use queries::{create_post_mutation, post_query, posts_key, posts_query};
pub use types::{NewPost, Post};
