pub mod catalog;
pub mod commands;
pub mod events;
pub mod image;
pub mod prompt;
pub mod session;
