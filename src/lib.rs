pub mod cards;
pub mod config;
pub mod error;
pub mod launcher;
pub mod plan;
pub mod scan;
pub mod scheduler;
pub mod shutdown;
pub mod tracker;
