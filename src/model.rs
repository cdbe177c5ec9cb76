pub mod account;
pub mod catalog;
pub mod history;
pub mod play;
pub mod team;
