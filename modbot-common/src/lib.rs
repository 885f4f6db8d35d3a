pub mod bot_commands;
pub mod gateway;
pub mod hub;
pub mod tgbot;
pub mod utils;

pub use mongodb;
pub use teloxide;
