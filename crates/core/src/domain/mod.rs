pub mod dispute;
pub mod event;
pub mod log;
pub mod merchant;
pub mod notification;
pub mod payload;
pub mod staff;
