pub mod orchestrator;
pub mod prompt_composer;
pub mod retriever;
pub mod session_store;
