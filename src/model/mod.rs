pub mod attendance;
pub mod member;
pub mod role;
pub mod user;
pub mod workout;
