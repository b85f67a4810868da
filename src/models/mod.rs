pub mod appointment;
pub mod notification;
pub mod oauth_token;
pub mod settings;
pub mod slot;

pub use appointment::{Appointment, AppointmentStatus, NewAppointment};
pub use notification::{Notification, NotificationKind};
pub use oauth_token::OAuthToken;
pub use settings::{CalendarSettings, IntegrationSettings, WhatsappSettings};
pub use slot::SlotTime;
