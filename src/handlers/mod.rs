pub mod appointments;
pub mod availability;
pub mod config;
pub mod health;
pub mod integrations;
pub mod notifications;
pub mod oauth;
