pub mod errors;
pub mod identity;
pub mod rate_limit;
pub mod state;
pub mod validation;
