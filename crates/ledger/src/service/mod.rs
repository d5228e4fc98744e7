pub mod bookings;
pub mod classes;
pub mod users;
pub mod view;
