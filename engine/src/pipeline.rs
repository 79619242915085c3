use std::{
    any::Any, collections::HashSet, future::Future, panic::AssertUnwindSafe, path::PathBuf,
};

use chrono::Utc;
use futures::{FutureExt, StreamExt, future, stream};
use log::{error, info, warn};
use thiserror::Error;

use crate::{
    DEFAULT_CONCURRENCY, ImgModBox, MAX_CONCURRENCY,
    image_model::{
        GenerationError, GenerationRequest, ImageSize,
        retry::{RetryPolicy, get_image_with_retry},
    },
    input::{ProductInput, ReferenceImage},
    output::{AssetMetadata, GeneratedAsset, OutputError, OutputWriter, WrittenAsset},
    prompt::ModulePrompt,
};

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_MODULE_FAILED: u8 = 1;
pub const EXIT_INVALID_INPUT: u8 = 2;

#[derive(Debug, Error)]
pub enum ModuleError {
    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Output(#[from] OutputError),

    #[error("Unexpected failure: {0}")]
    Unexpected(String),

    #[error("Interrupted before completion")]
    Interrupted,
}

#[derive(Debug)]
pub struct ModuleOutcome {
    pub module_id: String,
    pub result: Result<WrittenAsset, ModuleError>,
}

#[derive(Debug)]
pub struct RunSummary {
    /// One entry per prompt, in prompt order.
    pub outcomes: Vec<ModuleOutcome>,
}

impl RunSummary {
    pub fn succeeded(&self) -> impl Iterator<Item = &ModuleOutcome> {
        self.outcomes.iter().filter(|o| o.result.is_ok())
    }

    pub fn failed(&self) -> impl Iterator<Item = &ModuleOutcome> {
        self.outcomes.iter().filter(|o| o.result.is_err())
    }

    pub fn exit_code(&self) -> u8 {
        if self.failed().next().is_some() {
            EXIT_MODULE_FAILED
        } else {
            EXIT_SUCCESS
        }
    }
}

/// Runs every module prompt through generation and writing. Modules are independent: a failing
/// module is recorded and the others carry on.
pub struct Pipeline {
    model: ImgModBox,
    writer: OutputWriter,
    retry: RetryPolicy,
    concurrency: usize,
    size: ImageSize,
}

impl Pipeline {
    pub fn new(model: ImgModBox, writer: OutputWriter, retry: RetryPolicy) -> Self {
        Self {
            model,
            writer,
            retry,
            concurrency: DEFAULT_CONCURRENCY,
            size: ImageSize::default(),
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.clamp(1, MAX_CONCURRENCY);
        self
    }

    pub fn with_size(mut self, size: ImageSize) -> Self {
        self.size = size;
        self
    }

    pub fn outdir(&self) -> PathBuf {
        self.writer.outdir().to_path_buf()
    }

    pub async fn run(&self, input: &ProductInput, prompts: Vec<ModulePrompt>) -> RunSummary {
        self.run_until(input, prompts, future::pending()).await
    }

    /// Like [`Pipeline::run`], but stops once `interrupt` completes. Modules that haven't finished
    /// by then are abandoned and recorded as [`ModuleError::Interrupted`].
    pub async fn run_until(
        &self,
        input: &ProductInput,
        prompts: Vec<ModulePrompt>,
        interrupt: impl Future<Output = ()>,
    ) -> RunSummary {
        let references = input.references();
        info!(
            "Generating {} module(s) with {} ({} at a time)",
            prompts.len(),
            self.model.model(),
            self.concurrency
        );

        let mut finished: Vec<(usize, ModuleOutcome)> = stream::iter(prompts.iter().enumerate())
            .map(|(idx, prompt)| {
                self.run_module(prompt.clone(), &references)
                    .map(move |outcome| (idx, outcome))
            })
            .buffer_unordered(self.concurrency)
            .take_until(interrupt)
            .collect()
            .await;

        let done = finished.iter().map(|(idx, _)| *idx).collect::<HashSet<_>>();
        for (idx, prompt) in prompts.into_iter().enumerate() {
            if done.contains(&idx) {
                continue;
            }
            warn!("{}: interrupted before it finished", prompt.module_id);
            let error = ModuleError::Interrupted;
            self.record_failure(&prompt, &error);
            finished.push((
                idx,
                ModuleOutcome {
                    module_id: prompt.module_id,
                    result: Err(error),
                },
            ));
        }

        finished.sort_by_key(|(idx, _)| *idx);
        RunSummary {
            outcomes: finished.into_iter().map(|(_, outcome)| outcome).collect(),
        }
    }

    async fn run_module(&self, prompt: ModulePrompt, references: &[ReferenceImage]) -> ModuleOutcome {
        info!("{}: generating", prompt.module_id);

        let result = AssertUnwindSafe(self.generate_and_write(&prompt, references))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(ModuleError::Unexpected(panic_message(&*panic))));

        match &result {
            Ok(written) => info!(
                "{}: saved {}",
                prompt.module_id,
                written.image_path.display()
            ),
            Err(e) => {
                error!("{}: {e}", prompt.module_id);
                self.record_failure(&prompt, e);
            }
        }

        ModuleOutcome {
            module_id: prompt.module_id,
            result,
        }
    }

    /// Best effort: a failure that can't be recorded is only logged.
    fn record_failure(&self, prompt: &ModulePrompt, error: &ModuleError) {
        if let Err(write_err) = self.writer.write_failure(
            &prompt.module_id,
            &prompt.prompt_text,
            self.model.model(),
            Utc::now(),
            &error.to_string(),
        ) {
            error!("{}: couldn't record failure: {write_err}", prompt.module_id);
        }
    }

    async fn generate_and_write(
        &self,
        prompt: &ModulePrompt,
        references: &[ReferenceImage],
    ) -> Result<WrittenAsset, ModuleError> {
        let request = GenerationRequest {
            prompt: prompt.prompt_text.clone(),
            references: references.to_vec(),
            size: self.size,
        };

        let image =
            get_image_with_retry(self.model.as_ref(), &request, &self.retry, &prompt.module_id)
                .await?;

        let asset = GeneratedAsset {
            module_id: prompt.module_id.clone(),
            image,
            metadata: AssetMetadata {
                prompt: prompt.prompt_text.clone(),
                created_at: Utc::now(),
                model: self.model.model(),
            },
        };

        Ok(self.writer.write_asset(&asset)?)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with a non-string payload".into()
    }
}
