//! Environment-based configuration.

use std::{env, ffi::OsString, path::PathBuf, str::FromStr, time::Duration};

use anyhow::{anyhow, Context};

use crate::{
    decision::DecisionParams,
    resolution::Resolution,
    video::webcam::{ParamPreference, ENV_VAR_WEBCAM_NAME},
};

pub const ENV_VAR_MODEL: &str = "HANDMARK_MODEL";
pub const ENV_VAR_FPS: &str = "HANDMARK_FPS";
pub const ENV_VAR_PREFER: &str = "HANDMARK_PREFER";
pub const ENV_VAR_DISPLAY: &str = "HANDMARK_DISPLAY";
pub const ENV_VAR_DWELL_MS: &str = "HANDMARK_DWELL_MS";
pub const ENV_VAR_SNAPSHOT: &str = "HANDMARK_SNAPSHOT";

/// Runtime configuration of the hand tracking demo.
///
/// | Variable | Meaning | Default |
/// |----------|---------|---------|
/// | `HANDMARK_MODEL` | path to the `.onnx` landmark model | none |
/// | `HANDMARK_WEBCAM_NAME` | name of the webcam to open | first usable device |
/// | `HANDMARK_FPS` | camera frame rate | 30 |
/// | `HANDMARK_PREFER` | what the webcam negotiation favors, `framerate` or `resolution` | `framerate` |
/// | `HANDMARK_DISPLAY` | display resolution, `WIDTHxHEIGHT` | `1280x720` |
/// | `HANDMARK_DWELL_MS` | how long a hand must be visible before it is logged | 1000 |
/// | `HANDMARK_SNAPSHOT` | file to render the latest overlay into | none |
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub model: Option<PathBuf>,
    pub webcam_name: Option<String>,
    pub fps: u32,
    pub prefer: ParamPreference,
    pub display: Resolution,
    pub dwell: Duration,
    pub snapshot: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: None,
            webcam_name: None,
            fps: Self::DEFAULT_FPS,
            prefer: ParamPreference::default(),
            display: Resolution::RES_720P,
            dwell: DecisionParams::DEFAULT_DWELL,
            snapshot: None,
        }
    }
}

impl Config {
    pub const DEFAULT_FPS: u32 = 30;

    /// Reads the configuration from the process environment.
    ///
    /// Unset variables fall back to their defaults. A variable that is set but can't be parsed is
    /// an error naming the variable.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|var| env::var_os(var))
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<OsString>) -> anyhow::Result<Self> {
        let string = |var: &str| -> anyhow::Result<Option<String>> {
            match lookup(var) {
                None => Ok(None),
                Some(value) => value
                    .into_string()
                    .map(Some)
                    .map_err(|value| anyhow!("{var} is not valid UTF-8: {value:?}")),
            }
        };
        let parse = |var: &str| -> anyhow::Result<Option<u32>> {
            string(var)?
                .map(|value| parse_var(var, &value))
                .transpose()
        };

        let mut config = Self {
            model: lookup(ENV_VAR_MODEL).map(PathBuf::from),
            webcam_name: string(ENV_VAR_WEBCAM_NAME)?,
            snapshot: lookup(ENV_VAR_SNAPSHOT).map(PathBuf::from),
            ..Self::default()
        };
        if let Some(fps) = parse(ENV_VAR_FPS)? {
            if fps == 0 {
                return Err(anyhow!("{ENV_VAR_FPS} must be greater than 0"));
            }
            config.fps = fps;
        }
        if let Some(prefer) = string(ENV_VAR_PREFER)? {
            config.prefer = parse_var(ENV_VAR_PREFER, &prefer)?;
        }
        if let Some(display) = string(ENV_VAR_DISPLAY)? {
            config.display = parse_var(ENV_VAR_DISPLAY, &display)?;
        }
        if let Some(ms) = parse(ENV_VAR_DWELL_MS)? {
            config.dwell = Duration::from_millis(ms.into());
        }
        Ok(config)
    }

    /// Returns the model path, or an error if `HANDMARK_MODEL` wasn't set.
    pub fn model_path(&self) -> anyhow::Result<&PathBuf> {
        self.model
            .as_ref()
            .ok_or_else(|| anyhow!("{ENV_VAR_MODEL} must be set to the path of the landmark model"))
    }

    /// Returns the decision parameters for this configuration.
    pub fn decision_params(&self) -> DecisionParams {
        DecisionParams {
            dwell: self.dwell,
            ..DecisionParams::default()
        }
    }
}

fn parse_var<T>(var: &str, value: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: Into<anyhow::Error>,
{
    let parsed: anyhow::Result<T> = value.parse::<T>().map_err(Into::into);
    parsed.with_context(|| format!("invalid value '{value}' for {var}"))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars = vars
            .iter()
            .map(|(k, v)| (k.to_string(), OsString::from(v)))
            .collect::<HashMap<_, _>>();
        Config::from_lookup(|var| vars.get(var).cloned())
    }

    #[test]
    fn defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.fps, 30);
        assert_eq!(config.prefer, ParamPreference::Framerate);
        assert_eq!(config.display, Resolution::new(1280, 720));
        assert_eq!(config.dwell, Duration::from_millis(1000));
        assert!(config.model_path().is_err());
    }

    #[test]
    fn reads_all_variables() {
        let config = config(&[
            ("HANDMARK_MODEL", "hand_landmark.onnx"),
            ("HANDMARK_WEBCAM_NAME", "Integrated Camera"),
            ("HANDMARK_FPS", "60"),
            ("HANDMARK_PREFER", "resolution"),
            ("HANDMARK_DISPLAY", "640x480"),
            ("HANDMARK_DWELL_MS", "250"),
            ("HANDMARK_SNAPSHOT", "/tmp/overlay.png"),
        ])
        .unwrap();
        assert_eq!(
            config.model_path().unwrap(),
            &PathBuf::from("hand_landmark.onnx")
        );
        assert_eq!(config.webcam_name.as_deref(), Some("Integrated Camera"));
        assert_eq!(config.fps, 60);
        assert_eq!(config.prefer, ParamPreference::Resolution);
        assert_eq!(config.display, Resolution::new(640, 480));
        assert_eq!(config.decision_params().dwell, Duration::from_millis(250));
        assert_eq!(
            config.decision_params().presence_threshold,
            DecisionParams::DEFAULT_PRESENCE_THRESHOLD
        );
        assert_eq!(config.snapshot, Some(PathBuf::from("/tmp/overlay.png")));
    }

    #[test]
    fn errors_name_the_variable() {
        for (var, value) in [
            ("HANDMARK_FPS", "fast"),
            ("HANDMARK_FPS", "0"),
            ("HANDMARK_PREFER", "pixels"),
            ("HANDMARK_DISPLAY", "1280"),
            ("HANDMARK_DISPLAY", "0x720"),
            ("HANDMARK_DWELL_MS", "-5"),
        ] {
            let err = config(&[(var, value)]).unwrap_err();
            assert!(format!("{err:#}").contains(var), "{var}={value}: {err:#}");
        }
    }
}
