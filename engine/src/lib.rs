use crate::image_model::ImageModel;

pub mod image_model;
pub mod input;
pub mod output;
pub mod pipeline;
pub mod prompt;

pub type ImgModBox = Box<dyn ImageModel + Send + Sync>;
pub const DEFAULT_CONCURRENCY: usize = 2;
pub const MAX_CONCURRENCY: usize = 4;
pub const MAX_RETRIES: u32 = 3;
