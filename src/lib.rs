pub mod api;
pub mod cache;
pub mod cli;
pub mod config;
pub mod domain;
pub mod engagement;
pub mod error;
pub mod id;
pub mod invalidation;
pub mod moderation;
pub mod toggle;
pub mod version;
