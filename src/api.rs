pub mod account;
pub mod attempt;
pub mod catalog;
pub mod history;
pub mod prog;
pub mod team;

mod helper;
