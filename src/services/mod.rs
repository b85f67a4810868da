pub mod availability;
pub mod booking;
pub mod calendar;
pub mod crypto;
pub mod messaging;
pub mod notifications;
pub mod oauth;
pub mod settings;
