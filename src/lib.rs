// Library root
// ------------
// This crate publishes a static web build to the asset-hosting service. The
// binary (`main.rs`) loads a config and drives the pipeline through `ui`.
//
// Module responsibilities:
// - `config`: the upload job description and where it is loaded from.
// - `endpoints`: checks declared entry-point files before anything is sent.
// - `archive`: picks the supplied bundle or packs the static root into one.
// - `api`: HTTP calls to the service (upload server negotiation, upload).
// - `pipeline`: runs the stages in order and reports state transitions.
// - `ui`: terminal progress and result reporting for the CLI.
pub mod api;
pub mod archive;
pub mod config;
pub mod endpoints;
pub mod error;
pub mod pipeline;
pub mod ui;

pub use api::{UploadResult, UploadSession};
pub use archive::BundleArchive;
pub use config::UploadConfig;
pub use error::UploadError;
pub use pipeline::{deploy_bundle, Pipeline, PipelineState};
