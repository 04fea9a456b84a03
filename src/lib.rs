pub mod cms;
pub mod config;
pub mod email;
pub mod models;
pub mod newsletter;
pub mod startup;
#[cfg(test)]
pub mod test_utils;
pub mod utils;
pub mod web;

pub use utils::state;
