//! HTTP handlers

pub mod health;
pub mod attendance;
pub mod admin;

#[cfg(test)]
mod tests;
