use crate::{BlendCurve, Error, RootMotionMode, RuntimeConfig};
use serde::Deserialize;

#[derive(Debug, Deserialize, Default)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
struct RuntimeConfigDef {
    notify_seed: Option<u64>,
    dedicated_server: Option<bool>,
    root_motion_mode: Option<RootMotionModeDef>,
    blend_curve: Option<BlendCurveDef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
enum RootMotionModeDef {
    NoExtraction,
    IgnoreRootMotion,
    RootMotionFromEverything,
    RootMotionFromMontagesOnly,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BlendCurveDef {
    Named(String),
    Bezier([f32; 4]),
}

pub fn runtime_config_from_json_str(s: &str) -> Result<RuntimeConfig, Error> {
    let def: RuntimeConfigDef = serde_json::from_str(s).map_err(|e| Error::JsonParse {
        message: e.to_string(),
    })?;

    let defaults = RuntimeConfig::default();
    let config = RuntimeConfig {
        notify_seed: def.notify_seed.unwrap_or(defaults.notify_seed),
        dedicated_server: def.dedicated_server.unwrap_or(defaults.dedicated_server),
        root_motion_mode: def
            .root_motion_mode
            .map(convert_root_motion_mode)
            .unwrap_or(defaults.root_motion_mode),
        default_blend_curve: match def.blend_curve {
            Some(curve) => convert_blend_curve(curve)?,
            None => defaults.default_blend_curve,
        },
    };
    config.validate()?;
    Ok(config)
}

fn convert_root_motion_mode(def: RootMotionModeDef) -> RootMotionMode {
    match def {
        RootMotionModeDef::NoExtraction => RootMotionMode::NoExtraction,
        RootMotionModeDef::IgnoreRootMotion => RootMotionMode::IgnoreRootMotion,
        RootMotionModeDef::RootMotionFromEverything => RootMotionMode::RootMotionFromEverything,
        RootMotionModeDef::RootMotionFromMontagesOnly => {
            RootMotionMode::RootMotionFromMontagesOnly
        }
    }
}

fn convert_blend_curve(def: BlendCurveDef) -> Result<BlendCurve, Error> {
    match def {
        BlendCurveDef::Bezier([cx1, cy1, cx2, cy2]) => Ok(BlendCurve::Bezier { cx1, cy1, cx2, cy2 }),
        BlendCurveDef::Named(name) => match name.as_str() {
            "linear" => Ok(BlendCurve::Linear),
            "easeIn" => Ok(BlendCurve::EaseIn),
            "easeOut" => Ok(BlendCurve::EaseOut),
            "easeInOut" => Ok(BlendCurve::EaseInOut),
            "sinusoidal" => Ok(BlendCurve::Sinusoidal),
            _ => Err(Error::JsonParse {
                message: format!("unknown blend curve '{name}'"),
            }),
        },
    }
}
