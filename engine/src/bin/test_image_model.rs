use std::path::PathBuf;

use aplus_engine::{
    image_model::{GenerationRequest, ImageSize, Model},
    input::ReferenceImage,
};
use clap::Parser;
use color_eyre::Result;

/// Sends a single prompt to an image model and saves the result as `output.<ext>`.
#[derive(clap::Parser)]
struct Arg {
    model: Model,
    key: String,
    prompt: String,

    /// Reference images sent along with the prompt.
    #[arg(long = "reference")]
    references: Vec<PathBuf>,

    #[arg(long, default_value_t)]
    size: ImageSize,

    #[arg(long)]
    base_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    pretty_env_logger::init();
    let Arg {
        model,
        key,
        prompt,
        references,
        size,
        base_url,
    } = Arg::parse();
    let image_model = model.make(key, base_url)?;

    let request = GenerationRequest {
        prompt,
        references: references
            .iter()
            .map(|path| ReferenceImage::load(path))
            .collect::<Result<_, _>>()?,
        size,
    };

    let image = image_model.get_image(&request).await?;
    let path = format!("output.{}", image.extension());
    std::fs::write(&path, &image.data)?;
    println!("Saved {path}, {} bytes", image.data.len());

    Ok(())
}
