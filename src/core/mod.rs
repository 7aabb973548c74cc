pub mod config;
pub mod graph;
pub mod pipeline;
pub mod present;
pub mod store;
pub mod traversal;
pub mod variant;
