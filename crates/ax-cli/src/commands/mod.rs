//! CLI subcommands.

pub mod chat;
pub mod configure;
pub mod send;
pub mod serve;
