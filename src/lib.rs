//! Filesystem-backed object storage: buckets are directories, objects are
//! files, and every piece of metadata is derived from the disk on demand.

pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
