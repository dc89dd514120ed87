pub mod envelope;
pub mod notification;
pub mod token;
