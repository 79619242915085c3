use aplus_engine::{
    DEFAULT_CONCURRENCY,
    image_model::{ImageSize, Model, ModelProvider, retry::RetryPolicy},
    prompt::ModuleTemplate,
};
use nonempty::NonEmpty;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub openai_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub openai_base_url: Option<String>,
    pub gemini_base_url: Option<String>,
    pub model: Option<Model>,
    pub size: Option<ImageSize>,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub concurrency: usize,
    /// Replaces the built-in modules when set.
    pub templates: Option<NonEmpty<ModuleTemplate>>,
    pub style_instructions: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            gemini_api_key: None,
            openai_base_url: None,
            gemini_base_url: None,
            model: None,
            size: None,
            timeout_secs: RetryPolicy::DEFAULT_TIMEOUT.as_secs(),
            max_retries: RetryPolicy::DEFAULT_MAX_RETRIES,
            concurrency: DEFAULT_CONCURRENCY,
            templates: None,
            style_instructions: None,
        }
    }
}

impl Config {
    /// The configured key wins; otherwise the provider's environment variables are tried in order.
    /// Blank values are skipped.
    pub fn api_key(
        &self,
        provider: ModelProvider,
        env: impl Fn(&str) -> Option<String>,
    ) -> Option<String> {
        let configured = match provider {
            ModelProvider::OpenAI => &self.openai_api_key,
            ModelProvider::Google => &self.gemini_api_key,
        };

        let usable = |key: &String| !key.trim().is_empty();
        configured.clone().filter(usable).or_else(|| {
            provider
                .api_key_vars()
                .iter()
                .filter_map(|var| env(*var))
                .find(usable)
        })
    }

    pub fn base_url(&self, provider: ModelProvider) -> Option<String> {
        match provider {
            ModelProvider::OpenAI => self.openai_base_url.clone(),
            ModelProvider::Google => self.gemini_base_url.clone(),
        }
    }
}
