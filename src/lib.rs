pub mod cli;
pub mod config;
pub mod corrections;
pub mod export;
pub mod import;
pub mod logging;
pub mod matching;
pub mod merge;
pub mod models;
pub mod national_id;
pub mod normalize;
pub mod orchestrator;

pub mod error;
