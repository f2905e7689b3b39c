pub mod disposition;
pub mod token;
