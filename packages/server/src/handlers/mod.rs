pub mod gc;
pub mod health;
pub mod transfer;
