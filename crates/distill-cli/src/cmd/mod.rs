pub mod config;
pub mod history;
pub mod incident;
pub mod init;
pub mod recall;
pub mod rules;
