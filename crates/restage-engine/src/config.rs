use std::env;
use std::time::Duration;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_MARGIN_RATIO: f64 = 0.15;
pub const DEFAULT_TRANSFORM_MODEL: &str = "gemini-2.5-flash-image";
pub const DEFAULT_CHECKER_MODEL: &str = "gemini-2.5-pro";

/// Tunables for one [`crate::Pipeline`].
///
/// Every value can be overridden from the environment (`RESTAGE_*`); numeric
/// values outside their allowed range are clamped rather than rejected.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub max_attempts: u32,
    pub margin_ratio: f64,
    pub generation_timeout: Duration,
    pub check_timeout: Duration,
    pub transform_model: String,
    pub checker_model: String,
    pub transport_retries: usize,
    pub retry_backoff: Duration,
    pub deadline: Option<Duration>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            margin_ratio: DEFAULT_MARGIN_RATIO,
            generation_timeout: Duration::from_secs(180),
            check_timeout: Duration::from_secs(60),
            transform_model: DEFAULT_TRANSFORM_MODEL.to_string(),
            checker_model: DEFAULT_CHECKER_MODEL.to_string(),
            transport_retries: 2,
            retry_backoff: Duration::from_millis(1200),
            deadline: None,
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let defaults = Self::default();

        Self {
            max_attempts: parse_clamped(
                get("RESTAGE_MAX_ATTEMPTS"),
                f64::from(defaults.max_attempts),
                1.0,
                10.0,
            )
            .round() as u32,
            margin_ratio: parse_clamped(
                get("RESTAGE_MASK_MARGIN_RATIO"),
                defaults.margin_ratio,
                0.0,
                0.45,
            ),
            generation_timeout: Duration::from_secs_f64(parse_clamped(
                get("RESTAGE_GENERATION_TIMEOUT"),
                defaults.generation_timeout.as_secs_f64(),
                15.0,
                600.0,
            )),
            check_timeout: Duration::from_secs_f64(parse_clamped(
                get("RESTAGE_CHECK_TIMEOUT"),
                defaults.check_timeout.as_secs_f64(),
                5.0,
                300.0,
            )),
            transform_model: get("RESTAGE_TRANSFORM_MODEL").unwrap_or(defaults.transform_model),
            checker_model: get("RESTAGE_CHECKER_MODEL").unwrap_or(defaults.checker_model),
            transport_retries: parse_clamped(
                get("RESTAGE_TRANSPORT_RETRIES"),
                defaults.transport_retries as f64,
                0.0,
                4.0,
            )
            .round() as usize,
            retry_backoff: Duration::from_secs_f64(parse_clamped(
                get("RESTAGE_RETRY_BACKOFF"),
                defaults.retry_backoff.as_secs_f64(),
                0.1,
                10.0,
            )),
            deadline: get("RESTAGE_DEADLINE")
                .and_then(|raw| raw.parse::<f64>().ok())
                .filter(|secs| secs.is_finite() && *secs > 0.0)
                .map(Duration::from_secs_f64),
        }
    }
}

pub(crate) fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_clamped(raw: Option<String>, default: f64, min: f64, max: f64) -> f64 {
    raw.and_then(|value| value.parse::<f64>().ok())
        .filter(|value| value.is_finite())
        .unwrap_or(default)
        .clamp(min, max)
}
