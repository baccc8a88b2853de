pub mod calendar;
pub mod core;
pub mod dashboard;
pub mod lessons;
pub mod students;
pub mod teachers;
