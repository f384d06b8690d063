pub mod client;

pub use client::{build_http_client, join_url};
