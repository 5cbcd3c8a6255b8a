pub mod agents;
pub mod analyze;
pub mod config;
pub mod corpus;
pub mod diff;
pub mod reports;
pub mod stats;
pub mod status;
