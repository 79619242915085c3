use std::{future::Future, pin::Pin};

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use log::{debug, info};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{GenerationError, GenerationRequest, Image, ImageModel, Model};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const MODEL_NAME: &str = "gemini-2.5-flash-image";

/// Finish reasons that mean the candidate was withheld by a safety filter.
const BLOCKING_FINISH_REASONS: &[&str] = &[
    "SAFETY",
    "IMAGE_SAFETY",
    "PROHIBITED_CONTENT",
    "BLOCKLIST",
    "SPII",
];

#[derive(Clone)]
pub struct GeminiImage {
    api_key: String,
    base_url: String,
    client: Client,
}

impl GeminiImage {
    pub fn new(api_key: String, base_url: Option<String>, client: Client) -> Self {
        Self {
            api_key,
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.into())
                .trim_end_matches('/')
                .to_string(),
            client,
        }
    }
}

impl ImageModel for GeminiImage {
    fn get_image<'a>(
        &'a self,
        request: &'a GenerationRequest,
    ) -> Pin<Box<dyn Future<Output = Result<Image, GenerationError>> + Send + 'a>> {
        Box::pin(async move {
            let url = format!("{}/models/{MODEL_NAME}:generateContent", self.base_url);
            debug!(
                "POST {url} with {} reference image(s), aspect ratio {:?}",
                request.references.len(),
                request.size.aspect_ratio()
            );

            let resp = self
                .client
                .post(url)
                .header("x-goog-api-key", &self.api_key)
                .json(&GenerateContentRequest::new(request))
                .send()
                .await?;

            let status = resp.status();
            let body = resp.text().await?;
            if !status.is_success() {
                return Err(GenerationError::from_response_body(status.as_u16(), &body));
            }

            parse_response(&body)
        })
    }

    fn model(&self) -> Model {
        Model::GeminiFlashImage
    }
}

fn parse_response(body: &str) -> Result<Image, GenerationError> {
    let response: GenerateContentResponse = serde_json::from_str(body)
        .map_err(|e| GenerationError::MalformedResponse(format!("{e}: {body}")))?;

    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(GenerationError::ContentPolicy {
            message: format!("prompt blocked: {reason}"),
        });
    }

    let mut blocked = None;
    for candidate in response.candidates {
        if let Some(reason) = candidate.finish_reason {
            if BLOCKING_FINISH_REASONS.contains(&reason.as_str()) {
                blocked = Some(reason);
            }
        }

        let parts = candidate.content.map(|c| c.parts).unwrap_or_default();
        for part in parts {
            if let Some(text) = part.text {
                info!("Model note: {}", text.trim());
            }

            let Some(inline) = part.inline_data else {
                continue;
            };
            if inline.mime_type.starts_with("image/") {
                let data = BASE64.decode(inline.data.as_bytes()).map_err(|e| {
                    GenerationError::MalformedResponse(format!("invalid base64 image: {e}"))
                })?;
                return Ok(Image {
                    data,
                    mime_type: inline.mime_type,
                });
            }
        }
    }

    match blocked {
        Some(reason) => Err(GenerationError::ContentPolicy {
            message: format!("candidate withheld: {reason}"),
        }),
        None => Err(GenerationError::NoImage(
            "check safety filters or instruction content".into(),
        )),
    }
}

//
// ===== Gemini wire types =====
//

#[derive(Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

impl<'a> GenerateContentRequest<'a> {
    fn new(request: &'a GenerationRequest) -> Self {
        let mut parts = vec![RequestPart::Text {
            text: &request.prompt,
        }];
        parts.extend(request.references.iter().map(|r| RequestPart::Inline {
            inline_data: InlineData {
                mime_type: &r.mime_type,
                data: BASE64.encode(&r.data),
            },
        }));

        Self {
            contents: vec![Content { parts }],
            generation_config: GenerationConfig {
                response_modalities: vec!["TEXT", "IMAGE"],
                candidate_count: 1,
                image_config: request
                    .size
                    .aspect_ratio()
                    .map(|aspect_ratio| ImageConfig { aspect_ratio }),
            },
        }
    }
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum RequestPart<'a> {
    Text { text: &'a str },
    Inline { inline_data: InlineData<'a> },
}

#[derive(Serialize)]
struct InlineData<'a> {
    mime_type: &'a str,
    data: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_modalities: Vec<&'static str>,
    candidate_count: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_config: Option<ImageConfig>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageConfig {
    aspect_ratio: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    inline_data: Option<ResponseInlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponseInlineData {
    mime_type: String,
    data: String,
}
