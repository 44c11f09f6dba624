//! MyFlix - session, identity and route authorization for a streaming catalog
//!
//! Signed session cookies, OAuth/cookie identity resolution, a route
//! authorizer for page requests, and the account and catalog APIs behind them.

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
