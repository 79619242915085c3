use std::{
    fs, io,
    path::{Path, PathBuf},
};

use bytes::Bytes;
use log::debug;
use thiserror::Error;

/// Errors raised while reading the local inputs of a run. All of them are fatal: no module is
/// attempted once one of these occurs.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("File not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("Couldn't read {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("Not an image file: {} ({mime})", path.display())]
    NotAnImage { path: PathBuf, mime: String },

    #[error("You must provide either --title or --title-path")]
    MissingTitle,

    #[error("Ambiguous title source: provide only one of --title and --title-path")]
    AmbiguousTitle,

    #[error("The product title is empty")]
    EmptyTitle,

    #[error("Instruction file is empty: {}", path.display())]
    EmptyInstructions { path: PathBuf },

    #[error("Unknown module '{id}', available modules: {available}")]
    UnknownModule { id: String, available: String },

    #[error("Invalid module template '{id}': {reason}")]
    InvalidTemplate { id: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TitleSource {
    Literal(String),
    File(PathBuf),
}

impl TitleSource {
    /// Exactly one of the two flags has to be present.
    pub fn from_flags(
        title: Option<String>,
        title_path: Option<PathBuf>,
    ) -> Result<Self, InputError> {
        match (title, title_path) {
            (Some(title), None) => Ok(Self::Literal(title)),
            (None, Some(path)) => Ok(Self::File(path)),
            (None, None) => Err(InputError::MissingTitle),
            (Some(_), Some(_)) => Err(InputError::AmbiguousTitle),
        }
    }

    fn resolve(self) -> Result<String, InputError> {
        let raw = match self {
            TitleSource::Literal(title) => title,
            TitleSource::File(path) => read_text(&path)?,
        };

        let title = raw.trim();
        if title.is_empty() {
            return Err(InputError::EmptyTitle);
        }
        Ok(title.to_string())
    }
}

/// An input image that is sent along with the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceImage {
    pub file_name: String,
    pub mime_type: String,
    pub data: Bytes,
}

impl ReferenceImage {
    pub fn load(path: &Path) -> Result<Self, InputError> {
        if !path.is_file() {
            return Err(InputError::NotFound { path: path.into() });
        }

        let mime = mime_guess::from_path(path).first_or_octet_stream();
        if mime.type_() != mime_guess::mime::IMAGE {
            return Err(InputError::NotAnImage {
                path: path.into(),
                mime: mime.to_string(),
            });
        }

        let data = fs::read(path).map_err(|source| InputError::Read {
            path: path.into(),
            source,
        })?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".into());

        debug!("Loaded {file_name} ({mime}, {} bytes)", data.len());
        Ok(Self {
            file_name,
            mime_type: mime.to_string(),
            data: Bytes::from(data),
        })
    }
}

#[derive(Debug, Clone)]
pub struct ProductInput {
    pub product_image: ReferenceImage,
    pub logo_image: ReferenceImage,
    pub title: String,
}

impl ProductInput {
    pub fn references(&self) -> Vec<ReferenceImage> {
        vec![self.product_image.clone(), self.logo_image.clone()]
    }
}

pub fn load_input(
    product_path: &Path,
    logo_path: &Path,
    title: TitleSource,
) -> Result<ProductInput, InputError> {
    let product_image = ReferenceImage::load(product_path)?;
    let logo_image = ReferenceImage::load(logo_path)?;
    let title = title.resolve()?;

    Ok(ProductInput {
        product_image,
        logo_image,
        title,
    })
}

/// Reads additional brand/style instructions from a text file.
pub fn load_instructions(path: &Path) -> Result<String, InputError> {
    let text = read_text(path)?;
    let text = text.trim();
    if text.is_empty() {
        return Err(InputError::EmptyInstructions { path: path.into() });
    }
    Ok(text.to_string())
}

fn read_text(path: &Path) -> Result<String, InputError> {
    if !path.is_file() {
        return Err(InputError::NotFound { path: path.into() });
    }
    fs::read_to_string(path).map_err(|source| InputError::Read {
        path: path.into(),
        source,
    })
}
