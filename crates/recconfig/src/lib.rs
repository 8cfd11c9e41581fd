use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Recorder configuration as written in `recorder.toml`.
///
/// Every key is optional; missing keys take the defaults from
/// [`RecorderConfig::default`]. `genlock_rate` is deliberately not validated:
/// rates below one tick per second are clamped by the scheduler instead.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RecorderConfig {
    pub version: u32,
    pub width: u32,
    pub height: u32,
    pub genlock_rate: f64,
    pub game_time_rate: f64,
    pub record: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub movie_path: Option<PathBuf>,
    pub skip_first_frames: u64,
    pub prefer_video_encoding: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shader: Option<PathBuf>,
    /// Exponential smoothing applied to the timing statistics (0 = none).
    pub stats_smoothing: f64,
    pub timing: Timing,
    pub encoder: Encoder,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Timing {
    #[serde(
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub safety_margin: Duration,
    pub overshoot_fraction: f64,
    pub drop_fraction: f64,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            safety_margin: default_safety_margin(),
            overshoot_fraction: 0.1,
            drop_fraction: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Encoder {
    /// Encoder executable, looked up on `PATH` when not absolute.
    pub program: PathBuf,
    pub preset: String,
    pub crf: u8,
}

impl Default for Encoder {
    fn default() -> Self {
        Self {
            program: PathBuf::from("ffmpeg"),
            preset: "slow".to_string(),
            crf: 12,
        }
    }
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            version: 1,
            width: 1920,
            height: 1080,
            genlock_rate: 24.0,
            game_time_rate: 24.0,
            record: false,
            movie_path: None,
            skip_first_frames: 0,
            prefer_video_encoding: false,
            shader: None,
            stats_smoothing: 0.0,
            timing: Timing::default(),
            encoder: Encoder::default(),
        }
    }
}

fn default_safety_margin() -> Duration {
    Duration::from_millis(10)
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    deserialize_duration_opt(deserializer).map(|d| d.unwrap_or_else(default_safety_margin))
}

fn serialize_duration<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&humantime::format_duration(*value).to_string())
}

/// Parses a duration given as seconds or as a human-readable string ("10ms").
pub fn parse_duration(raw: &str) -> Result<Duration, String> {
    let trimmed = raw.trim();
    if let Ok(seconds) = trimmed.parse::<f64>() {
        if seconds.is_nan() || seconds.is_sign_negative() || seconds.is_infinite() {
            return Err(format!("invalid duration '{raw}': must be non-negative"));
        }
        return Duration::try_from_secs_f64(seconds)
            .map_err(|err| format!("invalid duration '{raw}': {err}"));
    }
    humantime::parse_duration(trimmed).map_err(|err| format!("invalid duration '{raw}': {err}"))
}

fn deserialize_duration_opt<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Option<Duration>;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of seconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            parse_duration(v).map(Some).map_err(E::custom)
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(Duration::from_secs(v)))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Some(Duration::from_secs(v as u64)))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v.is_nan() || v.is_sign_negative() || v.is_infinite() {
                return Err(E::custom("duration must be non-negative"));
            }
            Duration::try_from_secs_f64(v).map(Some).map_err(E::custom)
        }

        fn visit_none<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }
    }

    deserializer.deserialize_any(Visitor)
}

impl RecorderConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: RecorderConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Loads `path` if it exists, otherwise returns the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != 1 {
            return Err(ConfigError::Invalid(format!(
                "unsupported config version {}; expected 1",
                self.version
            )));
        }

        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "resolution must be non-zero (got {}x{})",
                self.width, self.height
            )));
        }

        if !self.game_time_rate.is_finite() || self.game_time_rate <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "game_time_rate must be > 0 (got {})",
                self.game_time_rate
            )));
        }

        if self.genlock_rate.is_nan() {
            return Err(ConfigError::Invalid("genlock_rate must be a number".into()));
        }

        if self.record && self.movie_path.is_none() {
            return Err(ConfigError::Invalid(
                "record = true requires movie_path".into(),
            ));
        }

        if !(0.0..=0.999).contains(&self.stats_smoothing) {
            return Err(ConfigError::Invalid(format!(
                "stats_smoothing must be within [0, 0.999] (got {})",
                self.stats_smoothing
            )));
        }

        let timing = &self.timing;
        if !timing.overshoot_fraction.is_finite() || timing.overshoot_fraction <= 0.0 {
            return Err(ConfigError::Invalid(
                "timing.overshoot_fraction must be > 0".into(),
            ));
        }
        if !timing.drop_fraction.is_finite() || timing.drop_fraction < timing.overshoot_fraction {
            return Err(ConfigError::Invalid(
                "timing.drop_fraction must be >= timing.overshoot_fraction".into(),
            ));
        }
        if timing.safety_margin >= Duration::from_secs(1) {
            return Err(ConfigError::Invalid(
                "timing.safety_margin must be shorter than one second".into(),
            ));
        }

        if self.encoder.program.as_os_str().is_empty() {
            return Err(ConfigError::Invalid(
                "encoder.program must not be empty".into(),
            ));
        }
        if self.encoder.crf > 51 {
            return Err(ConfigError::Invalid(format!(
                "encoder.crf must be within 0-51 (got {})",
                self.encoder.crf
            )));
        }

        Ok(())
    }

    /// Names of the keys whose values differ between `self` and `other`.
    pub fn changed_keys(&self, other: &RecorderConfig) -> Vec<&'static str> {
        let mut keys = Vec::new();
        if self.width != other.width || self.height != other.height {
            keys.push("resolution");
        }
        if self.genlock_rate != other.genlock_rate {
            keys.push("genlock_rate");
        }
        if self.game_time_rate != other.game_time_rate {
            keys.push("game_time_rate");
        }
        if self.record != other.record {
            keys.push("record");
        }
        if self.movie_path != other.movie_path {
            keys.push("movie_path");
        }
        if self.skip_first_frames != other.skip_first_frames {
            keys.push("skip_first_frames");
        }
        if self.prefer_video_encoding != other.prefer_video_encoding {
            keys.push("prefer_video_encoding");
        }
        if self.shader != other.shader {
            keys.push("shader");
        }
        if self.stats_smoothing != other.stats_smoothing {
            keys.push("stats_smoothing");
        }
        if self.timing != other.timing {
            keys.push("timing");
        }
        if self.encoder != other.encoder {
            keys.push("encoder");
        }
        keys
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
version = 1
width = 1280
height = 720
genlock_rate = 30
game_time_rate = 29.97
record = true
movie_path = "/tmp/captures"
skip_first_frames = 5
prefer_video_encoding = true

[timing]
safety_margin = "5ms"
overshoot_fraction = 0.2

[encoder]
preset = "medium"
crf = 18
"#;

    #[test]
    fn parses_sample_config() {
        let config = RecorderConfig::from_toml_str(SAMPLE).expect("parse config");
        assert_eq!((config.width, config.height), (1280, 720));
        assert_eq!(config.genlock_rate, 30.0);
        assert_eq!(config.game_time_rate, 29.97);
        assert!(config.record);
        assert_eq!(config.movie_path, Some(PathBuf::from("/tmp/captures")));
        assert_eq!(config.skip_first_frames, 5);
        assert!(config.prefer_video_encoding);
        assert_eq!(config.timing.safety_margin, Duration::from_millis(5));
        assert_eq!(config.timing.overshoot_fraction, 0.2);
        assert_eq!(config.timing.drop_fraction, 1.0);
        assert_eq!(config.encoder.program, PathBuf::from("ffmpeg"));
        assert_eq!(config.encoder.crf, 18);
    }

    #[test]
    fn empty_file_uses_defaults() {
        let config = RecorderConfig::from_toml_str("").expect("defaults");
        assert_eq!(config, RecorderConfig::default());
    }

    #[test]
    fn accepts_degenerate_genlock_rate() {
        let config = RecorderConfig::from_toml_str("genlock_rate = 0").expect("clamped later");
        assert_eq!(config.genlock_rate, 0.0);
    }

    #[test]
    fn numeric_safety_margin_is_seconds() {
        let config = RecorderConfig::from_toml_str(
            r#"
[timing]
safety_margin = 0.002
"#,
        )
        .unwrap();
        assert_eq!(config.timing.safety_margin, Duration::from_millis(2));
    }

    #[test]
    fn rejects_zero_resolution() {
        let err = RecorderConfig::from_toml_str("width = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_non_positive_game_rate() {
        let err = RecorderConfig::from_toml_str("game_time_rate = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn record_requires_movie_path() {
        let err = RecorderConfig::from_toml_str("record = true").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_inverted_thresholds() {
        let err = RecorderConfig::from_toml_str(
            r#"
[timing]
overshoot_fraction = 0.5
drop_fraction = 0.25
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_unsupported_version() {
        let err = RecorderConfig::from_toml_str("version = 2").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn reports_changed_keys() {
        let base = RecorderConfig::from_toml_str(SAMPLE).unwrap();
        let mut edited = base.clone();
        edited.genlock_rate = 60.0;
        edited.height = 1080;
        assert_eq!(base.changed_keys(&edited), vec!["resolution", "genlock_rate"]);
        assert!(base.changed_keys(&base).is_empty());
    }

    #[test]
    fn serialised_config_parses_back() {
        let config = RecorderConfig::from_toml_str(SAMPLE).unwrap();
        let text = config.to_toml_string().unwrap();
        let reparsed = RecorderConfig::from_toml_str(&text).unwrap();
        assert_eq!(reparsed.timing.safety_margin, Duration::from_millis(5));
        assert_eq!(reparsed.movie_path, config.movie_path);
    }

    #[test]
    fn load_or_default_handles_missing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("recorder.toml");
        let config = RecorderConfig::load_or_default(&path).unwrap();
        assert_eq!(config, RecorderConfig::default());

        fs::write(&path, "width = 640\nheight = 480\n").unwrap();
        let config = RecorderConfig::load_or_default(&path).unwrap();
        assert_eq!((config.width, config.height), (640, 480));
    }

    #[test]
    fn parse_duration_accepts_both_forms() {
        assert_eq!(parse_duration("1.5").unwrap(), Duration::from_millis(1500));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert!(parse_duration("-1").is_err());
        assert!(parse_duration("soon").is_err());
        assert!(parse_duration("1e30").is_err());
    }

    #[test]
    fn oversized_safety_margin_is_an_error() {
        let err = RecorderConfig::from_toml_str("[timing]\nsafety_margin = 1e30\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));

        let err = RecorderConfig::from_toml_str("[timing]\nsafety_margin = \"1e30\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
