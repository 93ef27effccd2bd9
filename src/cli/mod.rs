// Command handlers for the authguard binary

pub mod audit;
pub mod rate_limit;
pub mod utils;
pub mod validate;
