//! Inkpost - A blogging platform API
//!
//! This library provides the core of the Inkpost service: accounts with
//! token authentication, posts, categories, threaded comments and likes,
//! served as JSON over HTTP.

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
