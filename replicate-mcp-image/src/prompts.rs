//! Prompt templates.

use replicate_mcp_common::error::Error;
use std::fmt;
use std::str::FromStr;

/// Name of the generation prompt template.
pub const GENERATE_IMAGE_PROMPT: &str = "generate-image";

/// Argument selecting the style.
pub const STYLE_ARGUMENT: &str = "style";

const PROMPT_LEAD: &str = "Describe the image you want to generate.";

/// Visual style offered by the `generate-image` prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageStyle {
    #[default]
    Realistic,
    Artistic,
    Abstract,
}

impl ImageStyle {
    pub const ALL: [ImageStyle; 3] = [ImageStyle::Realistic, ImageStyle::Artistic, ImageStyle::Abstract];

    pub fn as_str(&self) -> &'static str {
        match self {
            ImageStyle::Realistic => "realistic",
            ImageStyle::Artistic => "artistic",
            ImageStyle::Abstract => "abstract",
        }
    }

    /// Style-specific instruction appended to the prompt.
    pub fn guidance(&self) -> &'static str {
        match self {
            ImageStyle::Realistic => {
                "Create a photorealistic image with high detail and natural lighting."
            }
            ImageStyle::Artistic => {
                "Create an artistic image in the style of a painting with vibrant colors and expressive brushstrokes."
            }
            ImageStyle::Abstract => {
                "Create an abstract image with geometric shapes, bold colors, and non-representational forms."
            }
        }
    }

    /// User message produced by the template.
    pub fn message(&self) -> String {
        format!("{} {}", PROMPT_LEAD, self.guidance())
    }

    /// Comma-separated list of accepted values.
    pub fn choices() -> String {
        Self::ALL
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for ImageStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImageStyle {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "realistic" => Ok(ImageStyle::Realistic),
            "artistic" => Ok(ImageStyle::Artistic),
            "abstract" => Ok(ImageStyle::Abstract),
            _ => Err(Error::validation(format!(
                "Unknown style '{}'. Valid options: {}",
                s,
                Self::choices()
            ))),
        }
    }
}

/// Resolve the optional `style` argument; absent or blank means the default.
pub fn resolve_style(style: Option<&str>) -> Result<ImageStyle, Error> {
    match style.map(str::trim) {
        None | Some("") => Ok(ImageStyle::default()),
        Some(value) => value.parse(),
    }
}
