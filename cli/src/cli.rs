use std::path::PathBuf;

use aplus_engine::image_model::{ImageSize, Model};

/// Generate Amazon A+ Content module images from a product photo, a logo and a title.
#[derive(Debug, clap::Parser)]
#[command(name = "aplus", version)]
pub struct Cli {
    #[arg(long)]
    pub product_image: PathBuf,

    #[arg(long)]
    pub logo_image: PathBuf,

    /// Product title. Exactly one of --title and --title-path is required.
    #[arg(long)]
    pub title: Option<String>,

    /// Read the product title from a text file.
    #[arg(long)]
    pub title_path: Option<PathBuf>,

    #[arg(long)]
    pub outdir: PathBuf,

    #[arg(short, long)]
    pub verbose: bool,

    /// Defaults to the configured model, else gpt-image-1.
    #[arg(long)]
    pub model: Option<Model>,

    #[arg(long)]
    pub size: Option<ImageSize>,

    /// Only generate these modules. Can be given multiple times.
    #[arg(long = "module", value_name = "ID")]
    pub modules: Vec<String>,

    /// Extra brand and style instructions appended to every prompt.
    #[arg(long)]
    pub instructions_path: Option<PathBuf>,

    /// Use this config file instead of the default location.
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub concurrency: Option<usize>,

    #[arg(long)]
    pub timeout_secs: Option<u64>,

    #[arg(long)]
    pub max_retries: Option<u32>,
}
