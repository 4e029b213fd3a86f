//! StratLab Runner — orchestration, run configuration, batch runs, export.
//!
//! This crate builds on `stratlab-core` to provide:
//! - TOML run configuration with validation
//! - The Orchestrator: extract → fetch → indicators → simulate → `RunReport`
//! - Parallel batch runs over many symbols
//! - JSON (schema-versioned) and CSV export

pub mod config;
pub mod export;
pub mod runner;

pub use config::{
    BacktestSection, ConfigError, DataSection, RunConfig, SimulationSection, SourceKind,
};
pub use export::{
    export_equity_csv, export_json, export_trades_csv, import_json, load_report, save_report,
};
pub use runner::{dataset_hash, Orchestrator, RunError, RunReport, RunRequest, SCHEMA_VERSION};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn orchestrator_is_send_sync() {
        assert_send::<Orchestrator>();
        assert_sync::<Orchestrator>();
    }

    #[test]
    fn report_types_are_send_sync() {
        assert_send::<RunReport>();
        assert_sync::<RunReport>();
        assert_send::<RunRequest>();
        assert_sync::<RunRequest>();
    }

    #[test]
    fn config_types_are_send_sync() {
        assert_send::<RunConfig>();
        assert_sync::<RunConfig>();
    }
}
