pub mod client;
pub mod error;
pub mod experiment;
pub mod job;
pub mod record;
pub mod resource;
pub mod retry;
