pub mod attendance;
pub mod member;
pub mod report;
pub mod workout;
