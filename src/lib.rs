//! Authentication security utilities for the DealFlow sign-up and sign-in forms:
//! password and email scoring, phone formatting, input sanitizing and
//! rate limiting of failed authentication attempts.

pub mod audit;
pub mod cli;
pub mod config;
pub mod database;
pub mod security;
pub mod user;

pub use config::Config;
pub use security::{AuthSecurityManager, RateLimitStatus, SecurityError};
