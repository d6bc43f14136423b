//! API handlers module

pub mod conversations;
pub mod health;
