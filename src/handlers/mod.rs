pub mod calendar;
pub mod chat;
pub mod health;
pub mod schedule;
