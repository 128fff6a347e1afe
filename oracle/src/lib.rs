pub mod cfg;
pub mod claims;
pub mod db;
pub mod error;
pub mod metadata;
pub mod metrics;
pub mod notifier;
pub mod scheduler;
pub mod settings;
pub mod state_processor;
pub mod store;
pub mod submitter;
pub mod time;
pub mod tracker;
pub mod transaction;
pub mod validators;
