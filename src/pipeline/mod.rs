pub mod sandbox;
pub mod headers;
pub mod secrets;
pub mod docgen;
pub mod processor; // Run orchestrator: discover → headers → secrets → docs → summary

