//! Outreach engine — sequence progression, thread resolution, reply detection.

pub mod api;
pub mod batch;
pub mod cache;
pub mod clock;
pub mod config;
pub mod contacts;
pub mod error;
pub mod mail;
pub mod maintenance;
pub mod outreach;
pub mod replies;
pub mod sequence;
pub mod store;
pub mod threads;
