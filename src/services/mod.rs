pub mod delivery_service;
pub mod envelope;
pub mod rate_limit_service;
pub mod token_service;
