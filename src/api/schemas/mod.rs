pub mod push;
pub mod registration;
