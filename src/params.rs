//! Normalization and bounds checks for incoming render requests.
//!
//! [`validate`] is a pure function: it touches neither the filesystem nor any process, so a
//! rejected request never costs a working directory or an engine launch.

use std::io::Cursor;
use std::ops::RangeInclusive;

use base64::Engine as _;

use crate::foundation::error::{LogoProblem, RenderError, RenderResult};
use crate::material::MaterialPreset;

pub const EXTRUDE_DEPTH_RANGE: RangeInclusive<f64> = 0.01..=1.0;
pub const BEVEL_DEPTH_RANGE: RangeInclusive<f64> = 0.0..=0.1;

pub const DEFAULT_MATERIAL: MaterialPreset = MaterialPreset::Gold;
pub const DEFAULT_EXTRUDE_DEPTH: f64 = 0.1;
pub const DEFAULT_BEVEL_DEPTH: f64 = 0.02;

/// Longest accepted owner id. It becomes a storage key segment when artifacts are published.
pub const MAX_USER_ID_LEN: usize = 128;

/// Logo bytes as delivered by the transport layer.
#[derive(Clone, Debug)]
pub enum LogoPayload {
    /// Already decoded image bytes.
    Bytes(Vec<u8>),
    /// Base64 text, optionally wrapped in a `data:<mime>;base64,` URL.
    Encoded(String),
}

/// Raw, unvalidated request fields. Omitted fields fall back to the crate defaults.
#[derive(Clone, Debug)]
pub struct RenderRequest {
    pub logo: LogoPayload,
    pub material: Option<String>,
    pub extrude_depth: Option<f64>,
    pub bevel_depth: Option<f64>,
    /// Owner the published artifact is filed under.
    pub user_id: Option<String>,
}

impl RenderRequest {
    pub fn new(logo: LogoPayload) -> Self {
        Self {
            logo,
            material: None,
            extrude_depth: None,
            bevel_depth: None,
            user_id: None,
        }
    }

    pub fn with_material(mut self, material: impl Into<String>) -> Self {
        self.material = Some(material.into());
        self
    }

    pub fn with_extrude_depth(mut self, depth: f64) -> Self {
        self.extrude_depth = Some(depth);
        self
    }

    pub fn with_bevel_depth(mut self, depth: f64) -> Self {
        self.bevel_depth = Some(depth);
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogoFormat {
    Svg,
    Raster(image::ImageFormat),
}

impl LogoFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Svg => "svg",
            Self::Raster(f) => f.extensions_str().first().copied().unwrap_or("img"),
        }
    }

    pub fn is_vector(self) -> bool {
        matches!(self, Self::Svg)
    }
}

#[derive(Clone, Debug)]
pub struct ValidatedLogo {
    pub bytes: Vec<u8>,
    pub format: LogoFormat,
    pub width: u32,
    pub height: u32,
}

/// Strongly typed, bounds-checked request.
#[derive(Clone, Debug)]
pub struct RenderParams {
    pub logo: ValidatedLogo,
    pub material: MaterialPreset,
    pub extrude_depth: f64,
    pub bevel_depth: f64,
    pub user_id: Option<String>,
}

const RASTER_FORMATS: [image::ImageFormat; 6] = [
    image::ImageFormat::Png,
    image::ImageFormat::Jpeg,
    image::ImageFormat::WebP,
    image::ImageFormat::Bmp,
    image::ImageFormat::Gif,
    image::ImageFormat::Tiff,
];

pub fn validate(req: &RenderRequest) -> RenderResult<RenderParams> {
    let material = match req.material.as_deref() {
        Some(name) => name.parse()?,
        None => DEFAULT_MATERIAL,
    };
    let extrude_depth = check_depth(
        "extrude_depth",
        req.extrude_depth.unwrap_or(DEFAULT_EXTRUDE_DEPTH),
        EXTRUDE_DEPTH_RANGE,
    )?;
    let bevel_depth = check_depth(
        "bevel_depth",
        req.bevel_depth.unwrap_or(DEFAULT_BEVEL_DEPTH),
        BEVEL_DEPTH_RANGE,
    )?;
    let user_id = req.user_id.as_deref().map(check_user_id).transpose()?;
    let logo = validate_logo(&req.logo)?;

    Ok(RenderParams {
        logo,
        material,
        extrude_depth,
        bevel_depth,
        user_id,
    })
}

fn check_user_id(raw: &str) -> RenderResult<String> {
    let id = raw.trim();
    if id.is_empty() || id.len() > MAX_USER_ID_LEN {
        return Err(RenderError::invalid_parameter(
            "user_id",
            format!("user_id must be 1 to {MAX_USER_ID_LEN} characters"),
        ));
    }
    if !id
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    {
        return Err(RenderError::invalid_parameter(
            "user_id",
            format!("user_id may only contain ASCII letters, digits, '-' and '_', got '{id}'"),
        ));
    }
    Ok(id.to_string())
}

fn check_depth(
    field: &'static str,
    value: f64,
    range: RangeInclusive<f64>,
) -> RenderResult<f64> {
    if !value.is_finite() {
        return Err(RenderError::invalid_parameter(
            field,
            format!("{field} must be a finite number, got {value}"),
        ));
    }
    if !range.contains(&value) {
        return Err(RenderError::invalid_parameter(
            field,
            format!(
                "{field} must be between {} and {}, got {value}",
                range.start(),
                range.end()
            ),
        ));
    }
    Ok(value)
}

pub fn decode_payload(payload: &LogoPayload) -> RenderResult<Vec<u8>> {
    let bytes = match payload {
        LogoPayload::Bytes(b) => b.clone(),
        LogoPayload::Encoded(text) => {
            let body = strip_data_url(text)?;
            let compact: String = body.chars().filter(|c| !c.is_ascii_whitespace()).collect();
            base64::engine::general_purpose::STANDARD
                .decode(compact.as_bytes())
                .map_err(|e| RenderError::invalid_logo(LogoProblem::Decode, e.to_string()))?
        }
    };
    if bytes.is_empty() {
        return Err(RenderError::invalid_logo(
            LogoProblem::Empty,
            "logo contains no bytes",
        ));
    }
    Ok(bytes)
}

fn strip_data_url(text: &str) -> RenderResult<&str> {
    let text = text.trim();
    if !text.starts_with("data:") {
        return Ok(text);
    }
    text.split_once(',').map(|(_, body)| body).ok_or_else(|| {
        RenderError::invalid_logo(LogoProblem::Decode, "data URL has no ',' separator")
    })
}

fn validate_logo(payload: &LogoPayload) -> RenderResult<ValidatedLogo> {
    let bytes = decode_payload(payload)?;

    if let Ok(format) = image::guess_format(&bytes) {
        if !RASTER_FORMATS.contains(&format) {
            return Err(RenderError::invalid_logo(
                LogoProblem::UnsupportedFormat,
                format!("{format:?} logos are not supported"),
            ));
        }
        let (width, height) = image::ImageReader::with_format(Cursor::new(&bytes), format)
            .into_dimensions()
            .map_err(|e| RenderError::invalid_logo(LogoProblem::Decode, e.to_string()))?;
        return Ok(ValidatedLogo {
            bytes,
            format: LogoFormat::Raster(format),
            width,
            height,
        });
    }

    let tree = usvg::Tree::from_data(&bytes, &usvg::Options::default()).map_err(|_| {
        RenderError::invalid_logo(
            LogoProblem::UnsupportedFormat,
            "logo is neither a supported raster image nor SVG",
        )
    })?;
    let size = tree.size();
    Ok(ValidatedLogo {
        bytes,
        format: LogoFormat::Svg,
        width: size.width().ceil() as u32,
        height: size.height().ceil() as u32,
    })
}
