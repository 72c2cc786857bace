pub mod analyze;
pub mod health;
