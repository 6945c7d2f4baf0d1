pub mod attendance;
pub mod core;
pub mod gpa;
pub mod session;
