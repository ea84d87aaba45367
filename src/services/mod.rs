pub mod authorization;
pub mod orchestrator;
pub mod transfer;
