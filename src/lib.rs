pub mod command;
pub mod config;
pub mod demo;
pub mod i18n;
pub mod mappings;
pub mod server;
