mod common;
mod gc;
mod transfer;
