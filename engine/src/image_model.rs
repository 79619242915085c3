use std::{future::Future, pin::Pin, time::Duration};

use reqwest::Client;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};

use crate::{ImgModBox, input::ReferenceImage};

pub mod error;
pub use error::GenerationError;

pub mod gemini;
pub mod openai;
pub mod retry;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(
    Debug,
    Clone,
    Copy,
    Display,
    clap::ValueEnum,
    Serialize,
    Deserialize,
    Hash,
    PartialEq,
    Eq,
    EnumIter,
    Default,
)]
pub enum Model {
    #[default]
    #[strum(to_string = "gpt-image-1")]
    #[value(name = "gpt-image-1")]
    GptImage1,
    #[strum(to_string = "gemini-2.5-flash-image")]
    #[value(name = "gemini-flash-image")]
    GeminiFlashImage,
}

#[derive(Debug, Clone, Copy, Display, Serialize, Deserialize, Hash, PartialEq, Eq, EnumIter)]
pub enum ModelProvider {
    OpenAI,
    Google,
}

impl Model {
    pub fn make(&self, key: String, base_url: Option<String>) -> reqwest::Result<ImgModBox> {
        let client = http_client()?;
        let image_model: ImgModBox = match self {
            Model::GptImage1 => Box::new(openai::GptImage::new(key, base_url, client)),
            Model::GeminiFlashImage => Box::new(gemini::GeminiImage::new(key, base_url, client)),
        };
        Ok(image_model)
    }

    pub fn provider(&self) -> ModelProvider {
        match self {
            Model::GptImage1 => ModelProvider::OpenAI,
            Model::GeminiFlashImage => ModelProvider::Google,
        }
    }
}

impl ModelProvider {
    /// Environment variables checked for a credential, in order.
    pub fn api_key_vars(&self) -> &'static [&'static str] {
        match self {
            ModelProvider::OpenAI => &["OPENAI_API_KEY"],
            ModelProvider::Google => &["GEMINI_API_KEY", "GOOGLE_API_KEY"],
        }
    }
}

fn http_client() -> reqwest::Result<Client> {
    Client::builder().connect_timeout(CONNECT_TIMEOUT).build()
}

/// Sizes accepted by the generation endpoints. The A+ canvas is 970x600, so the landscape size
/// is the closest match.
#[derive(
    Debug,
    Clone,
    Copy,
    Display,
    clap::ValueEnum,
    Serialize,
    Deserialize,
    Hash,
    PartialEq,
    Eq,
    EnumIter,
    Default,
)]
pub enum ImageSize {
    #[strum(to_string = "1024x1024")]
    #[value(name = "1024x1024")]
    Square,
    #[strum(to_string = "1024x1536")]
    #[value(name = "1024x1536")]
    Portrait,
    #[default]
    #[strum(to_string = "1536x1024")]
    #[value(name = "1536x1024")]
    Landscape,
    #[strum(to_string = "auto")]
    #[value(name = "auto")]
    Auto,
}

impl ImageSize {
    pub fn aspect_ratio(&self) -> Option<&'static str> {
        match self {
            ImageSize::Square => Some("1:1"),
            ImageSize::Portrait => Some("2:3"),
            ImageSize::Landscape => Some("3:2"),
            ImageSize::Auto => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub references: Vec<ReferenceImage>,
    pub size: ImageSize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub data: Vec<u8>,
    pub mime_type: String,
}

impl Image {
    pub const EXTENSIONS: [&'static str; 4] = ["png", "jpg", "webp", "bin"];

    pub fn extension(&self) -> &'static str {
        match self.mime_type.as_str() {
            "image/png" => "png",
            "image/jpeg" | "image/jpg" => "jpg",
            "image/webp" => "webp",
            _ => "bin",
        }
    }
}

pub trait ImageModel {
    fn get_image<'a>(
        &'a self,
        request: &'a GenerationRequest,
    ) -> Pin<Box<dyn Future<Output = Result<Image, GenerationError>> + Send + 'a>>;

    fn model(&self) -> Model;
}
