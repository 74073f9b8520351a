pub mod actor;
pub mod item;
pub mod section;
