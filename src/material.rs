//! Named material presets and the shader parameters each one resolves to.
//!
//! The table in [`MaterialPreset::shader`] is the single source of truth: validation accepts
//! exactly the names listed in [`MaterialPreset::ALL`], and the scene builder hands the resolved
//! [`ShaderParams`] to the engine unchanged.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::foundation::error::{RenderError, RenderResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaterialPreset {
    Gold,
    Chrome,
    Silver,
    Glass,
    Matte,
    Metallic,
    Glossy,
    Flat,
}

/// Principled-BSDF style inputs handed to the engine.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShaderParams {
    /// Linear RGBA, straight alpha.
    pub base_color: [f32; 4],
    pub metallic: f32,
    pub roughness: f32,
    /// `0.0` for opaque presets.
    pub transmission: f32,
    /// Only meaningful when `transmission > 0`.
    pub ior: Option<f32>,
}

const NEUTRAL: [f32; 4] = [0.8, 0.8, 0.8, 1.0];

impl MaterialPreset {
    pub const ALL: [MaterialPreset; 8] = [
        Self::Gold,
        Self::Chrome,
        Self::Silver,
        Self::Glass,
        Self::Matte,
        Self::Metallic,
        Self::Glossy,
        Self::Flat,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Gold => "gold",
            Self::Chrome => "chrome",
            Self::Silver => "silver",
            Self::Glass => "glass",
            Self::Matte => "matte",
            Self::Metallic => "metallic",
            Self::Glossy => "glossy",
            Self::Flat => "flat",
        }
    }

    pub fn shader(self) -> ShaderParams {
        let opaque = |base_color: [f32; 4], metallic: f32, roughness: f32| ShaderParams {
            base_color,
            metallic,
            roughness,
            transmission: 0.0,
            ior: None,
        };
        match self {
            Self::Gold => opaque([1.0, 0.766, 0.336, 1.0], 1.0, 0.2),
            Self::Chrome => opaque(NEUTRAL, 1.0, 0.05),
            Self::Silver => opaque([0.972, 0.960, 0.915, 1.0], 1.0, 0.15),
            Self::Glass => ShaderParams {
                base_color: [1.0, 1.0, 1.0, 1.0],
                metallic: 0.0,
                roughness: 0.0,
                transmission: 1.0,
                ior: Some(1.45),
            },
            Self::Matte => opaque(NEUTRAL, 0.0, 0.8),
            Self::Metallic => opaque(NEUTRAL, 1.0, 0.3),
            Self::Glossy => opaque(NEUTRAL, 0.0, 0.1),
            Self::Flat => opaque(NEUTRAL, 0.0, 1.0),
        }
    }

    /// Accepted spellings, for error messages.
    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(|p| p.name()).collect()
    }
}

impl std::fmt::Display for MaterialPreset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MaterialPreset {
    type Err = RenderError;

    fn from_str(s: &str) -> RenderResult<Self> {
        let needle = s.trim().to_ascii_lowercase();
        // "golden" is the legacy spelling still sent by older clients.
        if needle == "golden" {
            return Ok(Self::Gold);
        }
        Self::ALL
            .into_iter()
            .find(|p| p.name() == needle)
            .ok_or_else(|| {
                RenderError::invalid_parameter(
                    "material",
                    format!(
                        "unknown material preset '{s}', expected one of: {}",
                        Self::names().join(", ")
                    ),
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_preset_round_trips_through_its_name() {
        for preset in MaterialPreset::ALL {
            assert_eq!(preset.name().parse::<MaterialPreset>().unwrap(), preset);
        }
    }

    #[test]
    fn parsing_is_case_insensitive_and_accepts_golden() {
        assert_eq!(" Chrome ".parse::<MaterialPreset>().unwrap(), MaterialPreset::Chrome);
        assert_eq!("golden".parse::<MaterialPreset>().unwrap(), MaterialPreset::Gold);
    }

    #[test]
    fn unknown_name_is_invalid_material() {
        let err = "plastic".parse::<MaterialPreset>().unwrap_err();
        assert!(matches!(
            err,
            RenderError::InvalidParameter {
                field: "material",
                ..
            }
        ));
        assert!(err.to_string().contains("plastic"));
    }

    #[test]
    fn presets_resolve_to_distinct_shader_params() {
        let shaders: Vec<_> = MaterialPreset::ALL.iter().map(|p| p.shader()).collect();
        for (i, a) in shaders.iter().enumerate() {
            assert!((0.0..=1.0).contains(&a.roughness));
            assert!((0.0..=1.0).contains(&a.metallic));
            for b in &shaders[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn only_glass_transmits() {
        for preset in MaterialPreset::ALL {
            let shader = preset.shader();
            if preset == MaterialPreset::Glass {
                assert_eq!(shader.transmission, 1.0);
                assert!(shader.ior.is_some());
            } else {
                assert_eq!(shader.transmission, 0.0);
                assert!(shader.ior.is_none());
            }
        }
    }
}
