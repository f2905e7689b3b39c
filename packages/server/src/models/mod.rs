pub mod gc;
pub mod health;
