pub mod booking;
pub mod class;
pub mod decimal;
pub mod errors;
pub mod session;
pub mod user;
