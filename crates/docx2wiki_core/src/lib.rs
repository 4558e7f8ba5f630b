pub mod config;
pub mod confluence;
pub mod convert;
pub mod discover;
pub mod housekeeping;
pub mod journal;
pub mod rewrite;
pub mod runtime;
pub mod titles;
pub mod upload;
