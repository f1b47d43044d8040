pub mod manifest;
pub mod pipeline;
pub mod settings;

pub use pipeline::{
    extract, file_size, inspect, rebuild, status, ExtractOutcome, ExtractionReport, InspectReport,
    Integrity, ProjectStatus, RebuildOutcome,
};
pub use settings::{LocatorSettings, PathSettings, Settings, Workspace};
