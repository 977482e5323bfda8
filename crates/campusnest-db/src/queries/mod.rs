pub mod favorites;
pub mod messages;
pub mod notifications;
pub mod properties;
pub mod ratings;
pub mod rentals;
pub mod reports;
pub mod users;
