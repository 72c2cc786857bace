use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

/// Application-level constants
pub const APP_NAME: &str = "labtriage";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prefix shared by every environment variable the service reads.
pub const ENV_PREFIX: &str = "LABTRIAGE_";

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";
const DEFAULT_UPLOAD_DIR: &str = "uploads";
const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const DEFAULT_EXTRACTION_MODEL: &str = "medgemma:4b";
const DEFAULT_VISION_MODEL: &str = "medgemma:4b";
const DEFAULT_OCR_LANGUAGE: &str = "eng";
const DEFAULT_TESSERACT_BIN: &str = "tesseract";
const DEFAULT_LLM_TIMEOUT_SECS: u64 = 300;
const DEFAULT_SCORING_TIMEOUT_SECS: u64 = 10;
const DEFAULT_MAX_UPLOAD_MB: u64 = 25;

/// Log filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "labtriage=info,tower_http=info"
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },
}

/// Which engine turns an image into text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OcrBackend {
    /// Tesseract. Linked through libtesseract with the `ocr` feature, otherwise
    /// run as the `binary` subprocess.
    Tesseract {
        binary: PathBuf,
        /// `tessdata` directory. `None` uses the library's compiled-in default.
        tessdata_dir: Option<PathBuf>,
    },
    /// Ollama vision model, named by `AppConfig::vision_model`.
    Vision,
}

/// Deployment environment. Stack traces are only exposed outside production.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn is_production(self) -> bool {
        matches!(self, Environment::Production)
    }
}

/// Runtime configuration, resolved once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub upload_dir: PathBuf,
    /// External scoring endpoint. `None` disables the relay.
    pub scoring_url: Option<String>,
    pub scoring_timeout_secs: u64,
    pub ocr_backend: OcrBackend,
    pub ocr_language: String,
    pub ollama_url: String,
    pub extraction_model: String,
    pub vision_model: String,
    pub llm_timeout_secs: u64,
    /// Alternate normal-range catalog (JSON). `None` uses the built-in catalog.
    pub catalog_path: Option<PathBuf>,
    pub max_upload_bytes: usize,
    pub environment: Environment,
}

impl AppConfig {
    /// Read configuration from `LABTRIAGE_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(format!("{ENV_PREFIX}{key}")).ok())
    }

    /// Resolve configuration through an arbitrary key lookup.
    ///
    /// Keys are passed without the `LABTRIAGE_` prefix. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bind_addr = parse_or(&get("BIND_ADDR"), "BIND_ADDR", DEFAULT_BIND_ADDR)?;

        let backend = get("OCR_BACKEND")
            .unwrap_or_else(|| "tesseract".into())
            .to_ascii_lowercase();
        let ocr_backend = match backend.as_str() {
            "tesseract" => OcrBackend::Tesseract {
                binary: get("TESSERACT_BIN")
                    .unwrap_or_else(|| DEFAULT_TESSERACT_BIN.into())
                    .into(),
                tessdata_dir: get("TESSDATA_DIR").map(PathBuf::from),
            },
            "vision" => OcrBackend::Vision,
            other => {
                return Err(ConfigError::InvalidValue {
                    key: "OCR_BACKEND".into(),
                    reason: format!("expected 'tesseract' or 'vision', got '{other}'"),
                })
            }
        };

        let environment = match get("ENV").as_deref().map(str::to_ascii_lowercase) {
            Some(v) if v == "production" || v == "prod" => Environment::Production,
            _ => Environment::Development,
        };

        let scoring_url = get("SCORING_URL");
        if let Some(url) = &scoring_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::InvalidValue {
                    key: "SCORING_URL".into(),
                    reason: format!("'{url}' is not an http(s) URL"),
                });
            }
        }

        let max_upload_mb: u64 = parse_or(
            &get("MAX_UPLOAD_MB"),
            "MAX_UPLOAD_MB",
            &DEFAULT_MAX_UPLOAD_MB.to_string(),
        )?;
        let max_upload_bytes = max_upload_mb
            .checked_mul(1024 * 1024)
            .and_then(|bytes| usize::try_from(bytes).ok())
            .ok_or_else(|| ConfigError::InvalidValue {
                key: "MAX_UPLOAD_MB".into(),
                reason: format!("{max_upload_mb} MB does not fit in memory limits"),
            })?;

        Ok(Self {
            bind_addr,
            upload_dir: get("UPLOAD_DIR")
                .unwrap_or_else(|| DEFAULT_UPLOAD_DIR.into())
                .into(),
            scoring_url,
            scoring_timeout_secs: parse_or(
                &get("SCORING_TIMEOUT_SECS"),
                "SCORING_TIMEOUT_SECS",
                &DEFAULT_SCORING_TIMEOUT_SECS.to_string(),
            )?,
            ocr_backend,
            ocr_language: get("OCR_LANGUAGE").unwrap_or_else(|| DEFAULT_OCR_LANGUAGE.into()),
            ollama_url: get("OLLAMA_URL")
                .unwrap_or_else(|| DEFAULT_OLLAMA_URL.into())
                .trim_end_matches('/')
                .to_string(),
            extraction_model: get("EXTRACTION_MODEL")
                .unwrap_or_else(|| DEFAULT_EXTRACTION_MODEL.into()),
            vision_model: get("VISION_MODEL").unwrap_or_else(|| DEFAULT_VISION_MODEL.into()),
            llm_timeout_secs: parse_or(
                &get("LLM_TIMEOUT_SECS"),
                "LLM_TIMEOUT_SECS",
                &DEFAULT_LLM_TIMEOUT_SECS.to_string(),
            )?,
            catalog_path: get("CATALOG_PATH").map(PathBuf::from),
            max_upload_bytes,
            environment,
        })
    }
}

/// Parse `value`, or `default` when unset. Errors name the offending key.
fn parse_or<T>(value: &Option<String>, key: &str, default: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = value.as_deref().unwrap_or(default);
    raw.parse::<T>().map_err(|e| ConfigError::InvalidValue {
        key: key.to_string(),
        reason: format!("'{raw}': {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_when_environment_is_empty() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:8080");
        assert_eq!(config.upload_dir, PathBuf::from("uploads"));
        assert_eq!(config.scoring_url, None);
        assert_eq!(config.ocr_language, "eng");
        assert_eq!(
            config.ocr_backend,
            OcrBackend::Tesseract {
                binary: PathBuf::from("tesseract"),
                tessdata_dir: None,
            }
        );
        assert_eq!(config.max_upload_bytes, 25 * 1024 * 1024);
        assert_eq!(config.environment, Environment::Development);
        assert!(config.catalog_path.is_none());
    }

    #[test]
    fn overrides_are_applied() {
        let config = config_from(&[
            ("BIND_ADDR", "0.0.0.0:9000"),
            ("SCORING_URL", "http://scoring.local/predict"),
            ("OCR_BACKEND", "vision"),
            ("OCR_LANGUAGE", "eng+fra"),
            ("OLLAMA_URL", "http://gpu-box:11434/"),
            ("ENV", "production"),
            ("MAX_UPLOAD_MB", "5"),
        ])
        .unwrap();
        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.scoring_url.as_deref(), Some("http://scoring.local/predict"));
        assert_eq!(config.ocr_backend, OcrBackend::Vision);
        assert_eq!(config.ocr_language, "eng+fra");
        assert_eq!(config.ollama_url, "http://gpu-box:11434");
        assert!(config.environment.is_production());
        assert_eq!(config.max_upload_bytes, 5 * 1024 * 1024);
    }

    #[test]
    fn blank_values_count_as_unset() {
        let config = config_from(&[("SCORING_URL", "   "), ("OCR_LANGUAGE", "")]).unwrap();
        assert_eq!(config.scoring_url, None);
        assert_eq!(config.ocr_language, "eng");
    }

    #[test]
    fn rejects_unknown_ocr_backend() {
        let err = config_from(&[("OCR_BACKEND", "abbyy")]).unwrap_err();
        assert!(err.to_string().contains("OCR_BACKEND"));
    }

    #[test]
    fn rejects_malformed_bind_addr() {
        let err = config_from(&[("BIND_ADDR", "localhost")]).unwrap_err();
        assert!(err.to_string().contains("BIND_ADDR"));
    }

    #[test]
    fn rejects_upload_limit_that_overflows() {
        let huge = u64::MAX.to_string();
        let err = config_from(&[("MAX_UPLOAD_MB", huge.as_str())]).unwrap_err();
        assert!(err.to_string().contains("MAX_UPLOAD_MB"));
    }

    #[test]
    fn tessdata_dir_is_read() {
        let config = config_from(&[("TESSDATA_DIR", "/opt/tessdata")]).unwrap();
        assert!(matches!(
            config.ocr_backend,
            OcrBackend::Tesseract { tessdata_dir: Some(ref dir), .. } if dir == &PathBuf::from("/opt/tessdata")
        ));
    }

    #[test]
    fn rejects_non_http_scoring_url() {
        assert!(config_from(&[("SCORING_URL", "ftp://scores")]).is_err());
    }

    #[test]
    fn app_name_is_labtriage() {
        assert_eq!(APP_NAME, "labtriage");
    }
}
