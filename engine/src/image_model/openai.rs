use std::{future::Future, pin::Pin};

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use log::debug;
use reqwest::{
    Client, Response,
    multipart::{Form, Part},
};
use serde::{Deserialize, Serialize};

use super::{GenerationError, GenerationRequest, Image, ImageModel, Model};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const MODEL_NAME: &str = "gpt-image-1";

/// gpt-image-1. Requests that carry reference images go through the edits endpoint, plain
/// prompts through the generations endpoint.
#[derive(Clone)]
pub struct GptImage {
    api_key: String,
    base_url: String,
    client: Client,
}

impl GptImage {
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

    async fn edit(&self, request: &GenerationRequest) -> Result<Image, GenerationError> {
        let mut form = Form::new()
            .text("model", MODEL_NAME)
            .text("prompt", request.prompt.clone())
            .text("size", request.size.to_string())
            .text("n", "1");

        for reference in &request.references {
            let part = Part::bytes(reference.data.to_vec())
                .file_name(reference.file_name.clone())
                .mime_str(&reference.mime_type)
                .map_err(|e| GenerationError::InvalidRequest {
                    status: 0,
                    message: format!("{}: {e}", reference.file_name),
                })?;
            form = form.part("image[]", part);
        }

        let url = format!("{}/images/edits", self.base_url);
        debug!(
            "POST {url} with {} reference image(s), size {}",
            request.references.len(),
            request.size
        );
        let resp = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;

        read_response(resp).await
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<Image, GenerationError> {
        let url = format!("{}/images/generations", self.base_url);
        debug!("POST {url}, size {}", request.size);
        let resp = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&ImagesRequest::new(request))
            .send()
            .await?;

        read_response(resp).await
    }
}

impl ImageModel for GptImage {
    fn get_image<'a>(
        &'a self,
        request: &'a GenerationRequest,
    ) -> Pin<Box<dyn Future<Output = Result<Image, GenerationError>> + Send + 'a>> {
        Box::pin(async move {
            if request.references.is_empty() {
                self.generate(request).await
            } else {
                self.edit(request).await
            }
        })
    }

    fn model(&self) -> Model {
        Model::GptImage1
    }
}

async fn read_response(resp: Response) -> Result<Image, GenerationError> {
    let status = resp.status();
    let body = resp.text().await?;
    if !status.is_success() {
        return Err(GenerationError::from_response_body(status.as_u16(), &body));
    }
    parse_response(&body)
}

fn parse_response(body: &str) -> Result<Image, GenerationError> {
    let response: ImagesResponse = serde_json::from_str(body)
        .map_err(|e| GenerationError::MalformedResponse(format!("{e}: {body}")))?;

    let b64 = response
        .data
        .into_iter()
        .find_map(|d| d.b64_json)
        .ok_or_else(|| GenerationError::NoImage("response contained no b64_json data".into()))?;

    let data = BASE64
        .decode(b64.as_bytes())
        .map_err(|e| GenerationError::MalformedResponse(format!("invalid base64 image: {e}")))?;

    Ok(Image {
        data,
        mime_type: "image/png".into(),
    })
}

//
// ===== OpenAI wire types =====
//

#[derive(Serialize)]
struct ImagesRequest<'a> {
    model: &'static str,
    prompt: &'a str,
    size: String,
    n: u8,
}

impl<'a> ImagesRequest<'a> {
    fn new(request: &'a GenerationRequest) -> Self {
        Self {
            model: MODEL_NAME,
            prompt: &request.prompt,
            size: request.size.to_string(),
            n: 1,
        }
    }
}

#[derive(Deserialize)]
struct ImagesResponse {
    #[serde(default)]
    data: Vec<ImageData>,
}

#[derive(Deserialize)]
struct ImageData {
    #[serde(default)]
    b64_json: Option<String>,
}
