//! Subcommand implementations.

pub(crate) mod flash;
pub(crate) mod read;
pub(crate) mod sim;
