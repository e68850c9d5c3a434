use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{bail, Context, Result};

/// Policy applied when plate recognition yields no usable plate.
///
/// `Honest` leaves the plate undetected and lets the operator type it in.
/// `Synthesize` fabricates a valid demo plate with a high confidence score,
/// which is only appropriate for showroom/demo installations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlateFallback {
    Honest,
    Synthesize,
}

impl FromStr for PlateFallback {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "honest" => Ok(PlateFallback::Honest),
            "synthesize" => Ok(PlateFallback::Synthesize),
            other => bail!("invalid plate fallback policy '{other}' (expected honest|synthesize)"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server_host: String,
    pub server_port: u16,
    pub data_dir: PathBuf,
    pub session_secret: String,
    pub session_issuer: String,
    pub session_audience: String,
    pub session_expiry_minutes: i64,
    pub cors_allowed_origin: Option<String>,
    pub require_policy: bool,
    pub plate_fallback: PlateFallback,
    pub recognizer_command: Option<String>,
    pub camera_frames_dir: Option<PathBuf>,
    pub shops_file: Option<PathBuf>,
    pub extraction_delay_ms: u64,
    pub worker_poll_interval_ms: u64,
    pub recent_limit: usize,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let server_port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .context("SERVER_PORT must be a valid u16")?;
        let data_dir = env::var("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data"));
        let session_secret = env::var("SESSION_SECRET").context("SESSION_SECRET must be set")?;
        let session_issuer =
            env::var("SESSION_ISSUER").unwrap_or_else(|_| "glassdrive".to_string());
        let session_audience =
            env::var("SESSION_AUDIENCE").unwrap_or_else(|_| "glassdrive-clients".to_string());
        let session_expiry_minutes = env::var("SESSION_EXPIRY_MINUTES")
            .unwrap_or_else(|_| "480".to_string())
            .parse()
            .context("SESSION_EXPIRY_MINUTES must be an integer")?;
        let cors_allowed_origin = env::var("CORS_ALLOWED_ORIGIN").ok();
        let require_policy = env::var("REQUIRE_POLICY")
            .map(|v| !(v == "0" || v.eq_ignore_ascii_case("false")))
            .unwrap_or(true);
        let plate_fallback = env::var("PLATE_FALLBACK")
            .ok()
            .map(|v| v.parse())
            .transpose()?
            .unwrap_or(PlateFallback::Honest);
        let recognizer_command = env::var("RECOGNIZER_COMMAND").ok().filter(|v| !v.is_empty());
        let camera_frames_dir = env::var("CAMERA_FRAMES_DIR").ok().map(PathBuf::from);
        let shops_file = env::var("SHOPS_FILE").ok().map(PathBuf::from);
        let extraction_delay_ms = env::var("EXTRACTION_DELAY_MS")
            .unwrap_or_else(|_| "1000".to_string())
            .parse()
            .context("EXTRACTION_DELAY_MS must be an integer")?;
        let worker_poll_interval_ms = env::var("WORKER_POLL_INTERVAL_MS")
            .unwrap_or_else(|_| "500".to_string())
            .parse()
            .context("WORKER_POLL_INTERVAL_MS must be an integer")?;
        let recent_limit = env::var("RECENT_LIMIT")
            .unwrap_or_else(|_| "5".to_string())
            .parse()
            .context("RECENT_LIMIT must be an integer")?;

        Ok(Self {
            server_host,
            server_port,
            data_dir,
            session_secret,
            session_issuer,
            session_audience,
            session_expiry_minutes,
            cors_allowed_origin,
            require_policy,
            plate_fallback,
            recognizer_command,
            camera_frames_dir,
            shops_file,
            extraction_delay_ms,
            worker_poll_interval_ms,
            recent_limit,
        })
    }

    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("expedientes.json")
    }

    pub fn media_root(&self) -> PathBuf {
        self.data_dir.join("media")
    }
}

#[cfg(test)]
mod tests {
    use super::PlateFallback;

    #[test]
    fn parses_fallback_policies() {
        assert_eq!(
            "honest".parse::<PlateFallback>().unwrap(),
            PlateFallback::Honest
        );
        assert_eq!(
            "Synthesize".parse::<PlateFallback>().unwrap(),
            PlateFallback::Synthesize
        );
    }

    #[test]
    fn rejects_unknown_fallback_policy() {
        assert!("demo".parse::<PlateFallback>().is_err());
    }
}
