pub mod cli;
pub mod error;
pub mod replay;
pub mod signals;
