pub mod attendance;
pub mod backup_restore;
pub mod classconfig;
pub mod core;
pub mod dashboard;
pub mod exchange;
pub mod grades;
pub mod guests;
pub mod inventory;
pub mod journal;
pub mod liaison;
pub mod permissions;
pub mod planner;
pub mod session;
pub mod students;
