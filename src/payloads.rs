pub mod account;
pub mod catalog;
pub mod history;
pub mod play;
pub mod team;

/// Column widths of the `VARCHAR` fields users type into.
pub const NAME_MAX_LENGTH: usize = 100;
pub const TITLE_MAX_LENGTH: usize = 255;
pub const EMAIL_MAX_LENGTH: usize = 255;
