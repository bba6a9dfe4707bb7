//! Configuration types.

use secrecy::SecretString;

use crate::booking::model::BookingPattern;
use crate::error::ConfigError;

/// Default model for the concierge and ID checks.
pub const DEFAULT_LLM_MODEL: &str = "claude-sonnet-4-20250514";

/// Knobs of the booking wizard itself.
#[derive(Debug, Clone)]
pub struct WizardConfig {
    /// First bookable slot of the day (hour).
    pub first_slot_hour: u32,
    /// Last bookable slot of the day (hour, inclusive).
    pub last_slot_hour: u32,
    /// Same-day lead time in hours.
    pub same_day_lead_hours: u32,
    /// Days ahead (including today) that can be booked.
    pub booking_window_days: u32,
    /// Route of the login page the deferred submission redirects to.
    pub login_path: String,
}

impl Default for WizardConfig {
    fn default() -> Self {
        Self {
            first_slot_hour: 10,
            last_slot_hour: 20,
            same_day_lead_hours: 2,
            booking_window_days: 14,
            login_path: "/login".to_string(),
        }
    }
}

impl WizardConfig {
    /// Build from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            first_slot_hour: env_parse("WELLNESS_FIRST_SLOT_HOUR", defaults.first_slot_hour)?,
            last_slot_hour: env_parse("WELLNESS_LAST_SLOT_HOUR", defaults.last_slot_hour)?,
            same_day_lead_hours: env_parse("WELLNESS_LEAD_HOURS", defaults.same_day_lead_hours)?,
            booking_window_days: env_parse(
                "WELLNESS_BOOKING_WINDOW_DAYS",
                defaults.booking_window_days,
            )?,
            login_path: std::env::var("WELLNESS_LOGIN_PATH").unwrap_or(defaults.login_path),
        };
        if config.first_slot_hour > config.last_slot_hour || config.last_slot_hour > 23 {
            return Err(ConfigError::InvalidValue {
                key: "WELLNESS_FIRST_SLOT_HOUR/WELLNESS_LAST_SLOT_HOUR".to_string(),
                message: format!(
                    "slot hours {}..={} must be ordered and within 0..=23",
                    config.first_slot_hour, config.last_slot_hour
                ),
            });
        }
        Ok(config)
    }
}

/// Settings for the generative-AI collaborators.
#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub api_key: SecretString,
    pub model: String,
    pub base_url: String,
}

impl LlmSettings {
    /// Returns `None` if `ANTHROPIC_API_KEY` is not set (AI features disabled).
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY").ok()?;
        Some(Self {
            api_key: SecretString::from(api_key),
            model: std::env::var("WELLNESS_LLM_MODEL")
                .unwrap_or_else(|_| DEFAULT_LLM_MODEL.to_string()),
            base_url: std::env::var("ANTHROPIC_BASE_URL")
                .unwrap_or_else(|_| "https://api.anthropic.com".to_string()),
        })
    }
}

/// Process-level configuration of the booking service.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Base URL of the marketplace REST backend.
    pub api_base_url: String,
    /// Path of the libsql file backing session/local storage.
    pub session_db_path: String,
    /// Port the wizard HTTP surface listens on.
    pub port: u16,
    /// Pattern used when a mount request names none.
    pub pattern: BookingPattern,
    /// Therapist id seeded when a mount request names none.
    pub seed_therapist_id: Option<String>,
    /// Site id seeded when a mount request names none.
    pub seed_site_id: Option<String>,
    pub wizard: WizardConfig,
    pub llm: Option<LlmSettings>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let pattern = match std::env::var("WELLNESS_PATTERN") {
            Ok(raw) => raw.parse().map_err(|message| ConfigError::InvalidValue {
                key: "WELLNESS_PATTERN".to_string(),
                message,
            })?,
            Err(_) => BookingPattern::FromMap,
        };

        Ok(Self {
            api_base_url: std::env::var("WELLNESS_API_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            session_db_path: std::env::var("WELLNESS_SESSION_DB")
                .unwrap_or_else(|_| "./data/session.db".to_string()),
            port: env_parse("WELLNESS_PORT", 8080)?,
            pattern,
            seed_therapist_id: std::env::var("WELLNESS_SEED_THERAPIST").ok(),
            seed_site_id: std::env::var("WELLNESS_SEED_SITE").ok(),
            wizard: WizardConfig::from_env()?,
            llm: LlmSettings::from_env(),
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}
