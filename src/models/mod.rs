pub mod file;
pub mod todo;
pub mod user;
