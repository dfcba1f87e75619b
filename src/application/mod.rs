pub mod dispatcher;
pub mod orchestrator;
