pub mod agent;
pub mod conversation;
pub mod detect;
pub mod errors;
pub mod models;
pub mod prompts;
pub mod providers;
pub mod toolkits;
pub mod workflow;
