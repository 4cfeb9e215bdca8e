pub mod aggregator;
pub mod inference;
pub mod model_registry;
pub mod observation;
pub mod orchestrator;
pub mod report;
pub mod results;
