//! Declarative job description handed to the rendering engine.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::RenderSettings;
use crate::foundation::error::{RenderError, RenderResult};
use crate::material::{MaterialPreset, ShaderParams};
use crate::params::{RenderParams, ValidatedLogo};

/// File name of the serialized descriptor inside a job's working directory.
pub const SCENE_FILE_NAME: &str = "scene.json";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GeometryKind {
    /// Curves imported from SVG.
    Vector,
    /// Traced from a raster image.
    Raster,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GeometrySource {
    pub path: PathBuf,
    pub kind: GeometryKind,
    pub width: u32,
    pub height: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
    Z,
}

/// Turntable rotation over the whole frame range.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Animation {
    pub frame_start: u32,
    pub frame_end: u32,
    pub axis: Axis,
    pub turns: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LightRole {
    Key,
    Fill,
    Rim,
}

/// Area light, sized and placed in scene units.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Light {
    pub role: LightRole,
    pub location: [f32; 3],
    pub rotation_deg: [f32; 3],
    /// Watts.
    pub energy: f32,
    pub scale: f32,
}

const LIGHTS: [Light; 3] = [
    Light {
        role: LightRole::Key,
        location: [0.0, -6.0, 2.0],
        rotation_deg: [90.0, 0.0, 0.0],
        energy: 800.0,
        scale: 2.0,
    },
    Light {
        role: LightRole::Fill,
        location: [3.0, -6.0, 2.0],
        rotation_deg: [90.0, 0.0, -15.0],
        energy: 200.0,
        scale: 2.0,
    },
    Light {
        role: LightRole::Rim,
        location: [0.0, 4.0, 3.0],
        rotation_deg: [-90.0, 0.0, 0.0],
        energy: 200.0,
        scale: 2.0,
    },
];

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Camera {
    pub location: [f32; 3],
    pub rotation_deg: [f32; 3],
    /// Largest logo dimension after normalization, in scene units.
    pub fit_size: f32,
}

const CAMERA: Camera = Camera {
    location: [0.0, -10.0, 3.0],
    rotation_deg: [75.0, 0.0, 0.0],
    fit_size: 2.0,
};

/// Fully resolved render job. Immutable once built; re-running a job means building a new one.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SceneDescriptor {
    geometry: GeometrySource,
    extrude_depth: f64,
    bevel_depth: f64,
    material: MaterialPreset,
    shader: ShaderParams,
    animation: Animation,
    camera: Camera,
    lights: [Light; 3],
    render: RenderSettings,
}

impl SceneDescriptor {
    /// Stage the logo under `job_dir` and describe the scene around it.
    pub fn build(
        params: &RenderParams,
        job_dir: &Path,
        settings: &RenderSettings,
    ) -> RenderResult<Self> {
        let path = stage_logo(&params.logo, job_dir)?;
        let kind = if params.logo.format.is_vector() {
            GeometryKind::Vector
        } else {
            GeometryKind::Raster
        };

        Ok(Self {
            geometry: GeometrySource {
                path,
                kind,
                width: params.logo.width,
                height: params.logo.height,
            },
            extrude_depth: params.extrude_depth,
            bevel_depth: params.bevel_depth,
            material: params.material,
            shader: params.material.shader(),
            animation: Animation {
                frame_start: 1,
                frame_end: settings.frames,
                axis: Axis::X,
                turns: 1.0,
            },
            camera: CAMERA,
            lights: LIGHTS,
            render: settings.clone(),
        })
    }

    pub fn geometry(&self) -> &GeometrySource {
        &self.geometry
    }

    pub fn extrude_depth(&self) -> f64 {
        self.extrude_depth
    }

    pub fn bevel_depth(&self) -> f64 {
        self.bevel_depth
    }

    pub fn material(&self) -> MaterialPreset {
        self.material
    }

    pub fn shader(&self) -> &ShaderParams {
        &self.shader
    }

    pub fn animation(&self) -> &Animation {
        &self.animation
    }

    pub fn lights(&self) -> &[Light] {
        &self.lights
    }

    pub fn render(&self) -> &RenderSettings {
        &self.render
    }

    pub fn to_json(&self) -> RenderResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| RenderError::asset(format!("serialize scene descriptor: {e}")))
    }
}

fn stage_logo(logo: &ValidatedLogo, job_dir: &Path) -> RenderResult<PathBuf> {
    let path = job_dir.join(format!("logo.{}", logo.format.extension()));
    std::fs::write(&path, &logo.bytes)
        .map_err(|e| RenderError::asset(format!("write logo '{}': {e}", path.display())))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::LogoFormat;

    fn params(material: MaterialPreset) -> RenderParams {
        RenderParams {
            logo: ValidatedLogo {
                bytes: b"<svg/>".to_vec(),
                format: LogoFormat::Svg,
                width: 10,
                height: 5,
            },
            material,
            extrude_depth: 0.25,
            bevel_depth: 0.03,
            user_id: None,
        }
    }

    #[test]
    fn build_stages_logo_and_passes_values_through() {
        let dir = tempfile::tempdir().unwrap();
        let settings = RenderSettings::default();
        let scene =
            SceneDescriptor::build(&params(MaterialPreset::Chrome), dir.path(), &settings)
                .unwrap();

        assert_eq!(scene.geometry().path, dir.path().join("logo.svg"));
        assert_eq!(std::fs::read(&scene.geometry().path).unwrap(), b"<svg/>");
        assert_eq!(scene.geometry().kind, GeometryKind::Vector);
        assert_eq!(scene.extrude_depth(), 0.25);
        assert_eq!(scene.bevel_depth(), 0.03);
        assert_eq!(*scene.shader(), MaterialPreset::Chrome.shader());
        assert_eq!(scene.animation().frame_end, 240);
        assert_eq!(scene.render(), &settings);
    }

    #[test]
    fn every_preset_resolves_in_the_descriptor() {
        let dir = tempfile::tempdir().unwrap();
        for preset in MaterialPreset::ALL {
            let scene =
                SceneDescriptor::build(&params(preset), dir.path(), &RenderSettings::default())
                    .unwrap();
            assert_eq!(scene.material(), preset);
            assert_eq!(*scene.shader(), preset.shader());
        }
    }

    #[test]
    fn unwritable_location_is_an_asset_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("gone");
        let err = SceneDescriptor::build(
            &params(MaterialPreset::Gold),
            &missing,
            &RenderSettings::default(),
        )
        .unwrap_err();
        assert!(matches!(err, RenderError::Asset(_)));
    }

    #[test]
    fn json_carries_engine_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let scene = SceneDescriptor::build(
            &params(MaterialPreset::Glass),
            dir.path(),
            &RenderSettings::default(),
        )
        .unwrap();
        let v: serde_json::Value = serde_json::from_str(&scene.to_json().unwrap()).unwrap();
        assert_eq!(v["material"], "glass");
        assert_eq!(v["shader"]["transmission"], 1.0);
        assert_eq!(v["render"]["samples"], 4096);
        assert_eq!(v["render"]["frame_prefix"], "frame_");
        assert_eq!(v["geometry"]["kind"], "vector");
        assert_eq!(v["animation"]["axis"], "x");
        assert_eq!(v["animation"]["turns"], 1.0);
    }

    #[test]
    fn lighting_rig_is_key_fill_rim() {
        let dir = tempfile::tempdir().unwrap();
        let scene = SceneDescriptor::build(
            &params(MaterialPreset::Gold),
            dir.path(),
            &RenderSettings::default(),
        )
        .unwrap();
        let roles: Vec<LightRole> = scene.lights().iter().map(|l| l.role).collect();
        assert_eq!(roles, [LightRole::Key, LightRole::Fill, LightRole::Rim]);
        assert_eq!(scene.lights()[0].energy, 800.0);

        let v: serde_json::Value = serde_json::from_str(&scene.to_json().unwrap()).unwrap();
        assert_eq!(v["lights"][2]["role"], "rim");
    }
}
