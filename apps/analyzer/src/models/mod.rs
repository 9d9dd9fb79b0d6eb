pub mod entity;
pub mod job;
pub mod report;
pub mod resume;
pub mod user;
