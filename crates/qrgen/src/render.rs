//! Turns text into a QR code image. The encoder itself is the `qrcode` crate;
//! this module only lays modules out on a pixel grid.

use std::fmt::Write as _;
use std::io::Cursor;
use std::ops::RangeInclusive;
use std::str::FromStr;

use image::{DynamicImage, ImageBuffer, ImageFormat, Luma};
use qrcode::render::unicode;
use qrcode::{Color, QrCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const BOX_SIZE_RANGE: RangeInclusive<u32> = 5..=50;
pub const BORDER_RANGE: RangeInclusive<u32> = 1..=10;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("box size {0} is outside 5..=50")]
    BoxSizeOutOfRange(u32),
    #[error("border {0} is outside 1..=10")]
    BorderOutOfRange(u32),
    #[error("content does not fit in a QR code: {0}")]
    Encode(#[from] qrcode::types::QrError),
    #[error("failed to encode PNG: {0}")]
    Png(#[from] image::ImageError),
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
pub enum EcLevel {
    L,
    #[default]
    M,
    Q,
    H,
}

impl EcLevel {
    fn to_qr(self) -> qrcode::EcLevel {
        match self {
            Self::L => qrcode::EcLevel::L,
            Self::M => qrcode::EcLevel::M,
            Self::Q => qrcode::EcLevel::Q,
            Self::H => qrcode::EcLevel::H,
        }
    }
}

impl FromStr for EcLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "L" => Ok(Self::L),
            "M" => Ok(Self::M),
            "Q" => Ok(Self::Q),
            "H" => Ok(Self::H),
            other => Err(format!("unknown error correction level '{other}' (use L, M, Q or H)")),
        }
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Png,
    Svg,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Svg => "svg",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "png" => Ok(Self::Png),
            "svg" => Ok(Self::Svg),
            other => Err(format!("unknown format '{other}' (use png or svg)")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QrSettings {
    #[serde(default)]
    pub ec_level: EcLevel,
    #[serde(default = "default_box_size")]
    pub box_size: u32,
    #[serde(default = "default_border")]
    pub border: u32,
    #[serde(default)]
    pub format: OutputFormat,
}

fn default_box_size() -> u32 {
    10
}

fn default_border() -> u32 {
    4
}

impl Default for QrSettings {
    fn default() -> Self {
        Self {
            ec_level: EcLevel::default(),
            box_size: default_box_size(),
            border: default_border(),
            format: OutputFormat::default(),
        }
    }
}

impl QrSettings {
    pub fn validate(&self) -> Result<(), RenderError> {
        if !BOX_SIZE_RANGE.contains(&self.box_size) {
            return Err(RenderError::BoxSizeOutOfRange(self.box_size));
        }
        if !BORDER_RANGE.contains(&self.border) {
            return Err(RenderError::BorderOutOfRange(self.border));
        }
        Ok(())
    }
}

/// A rendered code: the encoded content, the file bytes in the chosen format
/// and a terminal preview.
#[derive(Debug, Clone)]
pub struct RenderedCode {
    pub content: String,
    pub format: OutputFormat,
    pub bytes: Vec<u8>,
    pub preview: String,
}

/// Prefix `http://` when `text` has no URL scheme.
pub fn normalize_url(text: &str) -> String {
    match url::Url::parse(text) {
        Ok(_) => text.to_string(),
        Err(_) => format!("http://{text}"),
    }
}

/// Render `text` with `settings`. Blank text renders nothing.
pub fn render(text: &str, settings: &QrSettings) -> Result<Option<RenderedCode>, RenderError> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }
    settings.validate()?;

    let content = normalize_url(text);
    let code = QrCode::with_error_correction_level(content.as_bytes(), settings.ec_level.to_qr())?;
    let bytes = match settings.format {
        OutputFormat::Png => encode_png(&code, settings)?,
        OutputFormat::Svg => encode_svg(&code, settings).into_bytes(),
    };
    let preview = code
        .render::<unicode::Dense1x2>()
        .dark_color(unicode::Dense1x2::Light)
        .light_color(unicode::Dense1x2::Dark)
        .build();

    Ok(Some(RenderedCode {
        content,
        format: settings.format,
        bytes,
        preview,
    }))
}

fn side_in_modules(code: &QrCode, border: u32) -> u32 {
    // QR versions top out at 177 modules per side.
    u32::try_from(code.width()).unwrap_or(u32::MAX) + 2 * border
}

fn encode_png(code: &QrCode, settings: &QrSettings) -> Result<Vec<u8>, RenderError> {
    let modules = side_in_modules(code, settings.border);
    let side = modules * settings.box_size;
    let width = code.width();
    let colors = code.to_colors();

    let buffer = ImageBuffer::from_fn(side, side, |x, y| {
        let module_x = (x / settings.box_size).checked_sub(settings.border);
        let module_y = (y / settings.box_size).checked_sub(settings.border);
        let dark = match (module_x, module_y) {
            (Some(mx), Some(my)) if (mx as usize) < width && (my as usize) < width => {
                colors[my as usize * width + mx as usize] == Color::Dark
            }
            _ => false,
        };
        if dark { Luma([0_u8]) } else { Luma([255_u8]) }
    });

    let mut bytes = Vec::new();
    DynamicImage::ImageLuma8(buffer).write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
}

fn encode_svg(code: &QrCode, settings: &QrSettings) -> String {
    let modules = side_in_modules(code, settings.border);
    let side = modules * settings.box_size;
    let width = code.width();
    let border = settings.border as usize;

    let mut path = String::new();
    for (index, color) in code.to_colors().iter().enumerate() {
        if *color == Color::Dark {
            let x = index % width + border;
            let y = index / width + border;
            let _ = write!(path, "M{x},{y}h1v1h-1z");
        }
    }

    format!(
        concat!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n",
            "<svg xmlns=\"http://www.w3.org/2000/svg\" version=\"1.1\" ",
            "width=\"{side}\" height=\"{side}\" viewBox=\"0 0 {modules} {modules}\" ",
            "shape-rendering=\"crispEdges\">\n",
            "<rect width=\"100%\" height=\"100%\" fill=\"#ffffff\"/>\n",
            "<path fill=\"#000000\" d=\"{path}\"/>\n",
            "</svg>\n"
        ),
        side = side,
        modules = modules,
        path = path
    )
}

#[cfg(test)]
mod tests {
    use super::{EcLevel, OutputFormat, QrSettings, RenderError, normalize_url, render};

    fn code_width(content: &str, level: EcLevel) -> u32 {
        let code = qrcode::QrCode::with_error_correction_level(content, level.to_qr())
            .expect("content should encode");
        u32::try_from(code.width()).expect("width should fit u32")
    }

    #[test]
    fn normalize_url_adds_scheme_only_when_missing() {
        assert_eq!(normalize_url("example.com"), "http://example.com");
        assert_eq!(normalize_url("https://example.com/a"), "https://example.com/a");
        assert_eq!(normalize_url("mailto:me@example.com"), "mailto:me@example.com");
    }

    #[test]
    fn defaults_match_desktop_app() {
        let settings = QrSettings::default();

        assert_eq!(settings.box_size, 10);
        assert_eq!(settings.border, 4);
        assert_eq!(settings.ec_level, EcLevel::M);
        assert_eq!(settings.format, OutputFormat::Png);
    }

    #[test]
    fn blank_text_renders_nothing() {
        let rendered = render("   ", &QrSettings::default()).expect("blank text should not fail");
        assert!(rendered.is_none());
    }

    #[test]
    fn png_dimensions_follow_box_size_and_border() {
        let settings = QrSettings {
            box_size: 5,
            border: 2,
            ..QrSettings::default()
        };

        let rendered = render("example.com", &settings)
            .expect("render should succeed")
            .expect("text should produce a code");
        let image = image::load_from_memory(&rendered.bytes).expect("PNG should decode");
        let modules = code_width("http://example.com", EcLevel::M);

        assert_eq!(image.width(), (modules + 2 * 2) * 5);
        assert_eq!(image.height(), image.width());
        assert_eq!(rendered.content, "http://example.com");
        assert!(!rendered.preview.is_empty());
    }

    #[test]
    fn svg_output_is_vector_document() {
        let settings = QrSettings {
            format: OutputFormat::Svg,
            ..QrSettings::default()
        };

        let rendered = render("https://example.com", &settings)
            .expect("render should succeed")
            .expect("text should produce a code");
        let svg = String::from_utf8(rendered.bytes).expect("SVG should be UTF-8");
        let modules = code_width("https://example.com", EcLevel::M) + 2 * 4;

        assert!(svg.starts_with("<?xml"));
        assert!(svg.contains(&format!("viewBox=\"0 0 {modules} {modules}\"")));
        assert!(svg.contains(&format!("width=\"{}\"", modules * 10)));
    }

    #[test]
    fn out_of_range_parameters_are_rejected() {
        let too_small = QrSettings {
            box_size: 4,
            ..QrSettings::default()
        };
        let too_wide = QrSettings {
            border: 11,
            ..QrSettings::default()
        };

        assert!(matches!(
            render("x", &too_small),
            Err(RenderError::BoxSizeOutOfRange(4))
        ));
        assert!(matches!(
            render("x", &too_wide),
            Err(RenderError::BorderOutOfRange(11))
        ));
    }

    #[test]
    fn parameter_names_parse_case_insensitively() {
        assert_eq!("h".parse::<EcLevel>(), Ok(EcLevel::H));
        assert_eq!("SVG".parse::<OutputFormat>(), Ok(OutputFormat::Svg));
        assert!("x".parse::<EcLevel>().is_err());
    }
}
