// UI layer: shows pipeline progress with an `indicatif` spinner and reports
// the outcome. All uploading happens in `pipeline`; this module only
// renders what it is told.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::api::UploadResult;
use crate::config::UploadConfig;
use crate::error::UploadError;
use crate::pipeline::{Pipeline, PipelineState};

/// Run the pipeline for `config` with a spinner that follows its state.
pub async fn run_with_progress(
    config: &UploadConfig,
    cancel: CancellationToken,
) -> Result<UploadResult, UploadError> {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
        spinner.set_style(style);
    }
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner.set_message("starting");

    let progress = spinner.clone();
    let pipeline = Pipeline::new().with_observer(move |state| {
        if !state.is_terminal() {
            progress.set_message(stage_message(state));
        }
    });

    let result = pipeline.run(config, cancel).await;
    spinner.finish_and_clear();
    result
}

/// Capitalized spinner text for a state.
pub fn stage_message(state: PipelineState) -> String {
    let text = state.to_string();
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect::<String>() + "...",
        None => text,
    }
}

/// Print the outcome of a run for the user.
pub fn report(result: &Result<UploadResult, UploadError>) {
    match result {
        Ok(upload) => println!("Bundle uploaded, version {}", upload.version),
        Err(e) => {
            println!("Upload failed: {}", e);
            if e.is_retryable() {
                println!("Nothing was published; run the command again later.");
            }
        }
    }
}
