pub mod cli;
pub mod daemon;
