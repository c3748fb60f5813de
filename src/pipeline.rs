// Upload pipeline.
//
// Runs the stages in a fixed order: endpoint validation, upload server
// negotiation, archive assembly, upload. The first failing stage ends the
// run; nothing is retried.

use std::fmt;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::api::{ApiClient, UploadResult};
use crate::archive::prepare_bundle;
use crate::config::UploadConfig;
use crate::endpoints::validate_endpoints;
use crate::error::UploadError;

/// Where a pipeline run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Init,
    EndpointsValidated,
    UploadUrlObtained,
    ArchiveReady,
    Uploaded,
    Done,
    /// Terminal failure, tagged with [`UploadError::kind`].
    Failed(&'static str),
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed(_))
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Init => f.write_str("validating endpoints"),
            PipelineState::EndpointsValidated => f.write_str("requesting upload server"),
            PipelineState::UploadUrlObtained => f.write_str("preparing bundle"),
            PipelineState::ArchiveReady => f.write_str("uploading bundle"),
            PipelineState::Uploaded => f.write_str("bundle uploaded"),
            PipelineState::Done => f.write_str("done"),
            PipelineState::Failed(kind) => write!(f, "failed ({kind})"),
        }
    }
}

type Observer = Box<dyn Fn(PipelineState) + Send + Sync>;

/// Sequences one bundle upload.
#[derive(Default)]
pub struct Pipeline {
    observer: Option<Observer>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Call `observer` on every state transition.
    pub fn with_observer(
        mut self,
        observer: impl Fn(PipelineState) + Send + Sync + 'static,
    ) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    /// Run the whole upload for `config` and return the assigned version.
    /// Cancelling `cancel` aborts the run at its next suspension point.
    pub async fn run(
        &self,
        config: &UploadConfig,
        cancel: CancellationToken,
    ) -> Result<UploadResult, UploadError> {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(UploadError::Cancelled),
            result = self.run_stages(config, &cancel) => result,
        };

        match &result {
            Ok(_) => self.transition(PipelineState::Done),
            Err(e) => {
                error!(kind = e.kind(), error = %e, "bundle upload failed");
                self.transition(PipelineState::Failed(e.kind()));
            }
        }
        result
    }

    async fn run_stages(
        &self,
        config: &UploadConfig,
        cancel: &CancellationToken,
    ) -> Result<UploadResult, UploadError> {
        config.validate()?;
        let client = ApiClient::from_config(config)?;
        self.transition(PipelineState::Init);

        let static_root = config.work_dir()?.join(&config.static_path);
        let endpoint_params = validate_endpoints(&config.endpoints, &static_root).await?;
        self.transition(PipelineState::EndpointsValidated);

        let session = client.get_upload_server(config, &endpoint_params).await?;
        self.transition(PipelineState::UploadUrlObtained);

        let bundle = prepare_bundle(config, cancel).await?;
        self.transition(PipelineState::ArchiveReady);

        let result = client.upload_bundle(&bundle, &session).await?;
        self.transition(PipelineState::Uploaded);
        Ok(result)
    }

    fn transition(&self, state: PipelineState) {
        info!(state = ?state, "pipeline state");
        if let Some(observer) = &self.observer {
            observer(state);
        }
    }
}

/// Upload a bundle with a default pipeline.
pub async fn deploy_bundle(config: &UploadConfig) -> Result<UploadResult, UploadError> {
    Pipeline::new().run(config, CancellationToken::new()).await
}
