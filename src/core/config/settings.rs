use super::parsing::{
    env_optional, env_or_default, parse_bool, parse_cors_origins, parse_environment, parse_f64,
    parse_i64, parse_u16, parse_u32, parse_u64,
};
use super::secret::load_or_create_secret_key;
use super::types::{
    AdminSettings, ApiSettings, AttendanceSettings, ConfigError, CorsSettings, DashboardSettings,
    DatabaseSettings, RedisSettings, RiskSettings, RuntimeSettings, SecuritySettings, ServerHost,
    ServerPort, ServerSettings, Settings, TelemetrySettings,
};

const MAX_DASHBOARD_CACHE_TTL_SECONDS: u64 = 300;
const MAX_DASHBOARD_TOP_N: i64 = 50;
const MAX_DASHBOARD_TREND_MONTHS: u32 = 24;

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let host = env_or_default("EW_HOST", "0.0.0.0");
        let port = env_or_default("EW_PORT", "8000");

        let environment =
            parse_environment(env_optional("EW_ENV").or_else(|| env_optional("ENVIRONMENT")));
        let strict_config =
            env_optional("EW_STRICT_CONFIG").map(|value| parse_bool(&value)).unwrap_or(false)
                || environment.is_production();

        let project_name = env_or_default("PROJECT_NAME", "Early Warning API");
        let version = env_or_default("VERSION", env!("CARGO_PKG_VERSION"));
        let api_v1_str = env_or_default("API_V1_STR", "/api/v1");

        let explicit_secret = env_optional("SECRET_KEY");
        if explicit_secret.is_none() && strict_config {
            return Err(ConfigError::MissingSecret("SECRET_KEY"));
        }
        let secret_key = explicit_secret.unwrap_or_else(load_or_create_secret_key);
        let algorithm = env_or_default("ALGORITHM", "HS256");

        let cors_origins = parse_cors_origins(env_optional("BACKEND_CORS_ORIGINS"))?;

        let postgres_server = env_or_default("POSTGRES_SERVER", "localhost");
        let postgres_port = parse_u16("POSTGRES_PORT", env_or_default("POSTGRES_PORT", "5432"))?;
        let postgres_user = env_or_default("POSTGRES_USER", "early_warning");
        let postgres_password = env_or_default("POSTGRES_PASSWORD", "");
        let postgres_db = env_or_default("POSTGRES_DB", "early_warning");
        let database_url = env_optional("DATABASE_URL");
        let max_connections =
            parse_u32("DATABASE_MAX_CONNECTIONS", env_or_default("DATABASE_MAX_CONNECTIONS", "30"))?;

        let redis_host = env_or_default("REDIS_HOST", "localhost");
        let redis_port = parse_u16("REDIS_PORT", env_or_default("REDIS_PORT", "6379"))?;
        let redis_db = parse_u16("REDIS_DB", env_or_default("REDIS_DB", "0"))?;
        let redis_password = env_or_default("REDIS_PASSWORD", "");

        let first_admin_email = env_or_default("FIRST_ADMIN_EMAIL", "");
        let first_admin_name = env_or_default("FIRST_ADMIN_NAME", "School Administrator");

        let risk = RiskSettings {
            medium_threshold: parse_f64(
                "RISK_MEDIUM_THRESHOLD",
                env_or_default("RISK_MEDIUM_THRESHOLD", "30"),
            )?,
            high_threshold: parse_f64(
                "RISK_HIGH_THRESHOLD",
                env_or_default("RISK_HIGH_THRESHOLD", "55"),
            )?,
            critical_threshold: parse_f64(
                "RISK_CRITICAL_THRESHOLD",
                env_or_default("RISK_CRITICAL_THRESHOLD", "75"),
            )?,
            absence_rate_weight: parse_f64(
                "RISK_ABSENCE_RATE_WEIGHT",
                env_or_default("RISK_ABSENCE_RATE_WEIGHT", "0.6"),
            )?,
            subject_streak_weight: parse_f64(
                "RISK_SUBJECT_STREAK_WEIGHT",
                env_or_default("RISK_SUBJECT_STREAK_WEIGHT", "5"),
            )?,
            full_day_streak_weight: parse_f64(
                "RISK_FULL_DAY_STREAK_WEIGHT",
                env_or_default("RISK_FULL_DAY_STREAK_WEIGHT", "6"),
            )?,
            subject_streak_limit: parse_u32(
                "ALERT_SUBJECT_STREAK_LIMIT",
                env_or_default("ALERT_SUBJECT_STREAK_LIMIT", "7"),
            )?,
            absence_rate_limit: parse_f64(
                "ALERT_ABSENCE_RATE_LIMIT",
                env_or_default("ALERT_ABSENCE_RATE_LIMIT", "40"),
            )?,
            full_day_streak_limit: parse_u32(
                "ALERT_FULL_DAY_STREAK_LIMIT",
                env_or_default("ALERT_FULL_DAY_STREAK_LIMIT", "5"),
            )?,
        };

        let allow_future_dates = env_optional("ATTENDANCE_ALLOW_FUTURE_DATES")
            .map(|value| parse_bool(&value))
            .unwrap_or(false);
        let history_recent_limit = parse_i64(
            "STUDENT_HISTORY_RECENT_LIMIT",
            env_or_default("STUDENT_HISTORY_RECENT_LIMIT", "30"),
        )?;

        let cache_ttl_seconds = parse_u64(
            "DASHBOARD_CACHE_TTL_SECONDS",
            env_or_default("DASHBOARD_CACHE_TTL_SECONDS", "120"),
        )?;
        let timeout_ms =
            parse_u64("DASHBOARD_TIMEOUT_MS", env_or_default("DASHBOARD_TIMEOUT_MS", "5000"))?;
        let trend_months =
            parse_u32("DASHBOARD_TREND_MONTHS", env_or_default("DASHBOARD_TREND_MONTHS", "6"))?;
        let top_n = parse_i64("DASHBOARD_TOP_N", env_or_default("DASHBOARD_TOP_N", "10"))?;

        let log_level = env_or_default("EW_LOG_LEVEL", "info");
        let json = env_optional("EW_LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);
        let prometheus_enabled =
            env_optional("PROMETHEUS_ENABLED").map(|value| parse_bool(&value)).unwrap_or(false);

        let settings = Self {
            server: ServerSettings {
                host: ServerHost::parse(host)?,
                port: ServerPort::parse(port)?,
            },
            runtime: RuntimeSettings { environment, strict_config },
            api: ApiSettings { project_name, version, api_v1_str },
            security: SecuritySettings { secret_key, algorithm },
            cors: CorsSettings { origins: cors_origins },
            database: DatabaseSettings {
                postgres_server,
                postgres_port,
                postgres_user,
                postgres_password,
                postgres_db,
                database_url,
                max_connections,
            },
            redis: RedisSettings {
                host: redis_host,
                port: redis_port,
                db: redis_db,
                password: redis_password,
            },
            admin: AdminSettings { first_admin_email, first_admin_name },
            risk,
            attendance: AttendanceSettings { allow_future_dates, history_recent_limit },
            dashboard: DashboardSettings { cache_ttl_seconds, timeout_ms, trend_months, top_n },
            telemetry: TelemetrySettings { log_level, json, prometheus_enabled },
        };

        settings.validate()?;
        Ok(settings)
    }

    pub(crate) fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host.0, self.server.port.0)
    }

    pub(crate) fn server_host(&self) -> &str {
        &self.server.host.0
    }

    pub(crate) fn server_port(&self) -> u16 {
        self.server.port.0
    }

    pub(crate) fn api(&self) -> &ApiSettings {
        &self.api
    }

    pub(crate) fn security(&self) -> &SecuritySettings {
        &self.security
    }

    pub(crate) fn cors(&self) -> &CorsSettings {
        &self.cors
    }

    pub(crate) fn database(&self) -> &DatabaseSettings {
        &self.database
    }

    pub(crate) fn redis(&self) -> &RedisSettings {
        &self.redis
    }

    pub(crate) fn admin(&self) -> &AdminSettings {
        &self.admin
    }

    pub(crate) fn risk(&self) -> &RiskSettings {
        &self.risk
    }

    pub(crate) fn attendance(&self) -> &AttendanceSettings {
        &self.attendance
    }

    pub(crate) fn dashboard(&self) -> &DashboardSettings {
        &self.dashboard
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(&self) -> Result<(), ConfigError> {
        validate_risk(&self.risk)?;

        if self.attendance.history_recent_limit < 1 || self.attendance.history_recent_limit > 500 {
            return Err(ConfigError::InvalidValue {
                field: "STUDENT_HISTORY_RECENT_LIMIT",
                value: self.attendance.history_recent_limit.to_string(),
            });
        }

        if self.dashboard.cache_ttl_seconds > MAX_DASHBOARD_CACHE_TTL_SECONDS {
            return Err(ConfigError::InvalidValue {
                field: "DASHBOARD_CACHE_TTL_SECONDS",
                value: self.dashboard.cache_ttl_seconds.to_string(),
            });
        }

        if self.dashboard.timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "DASHBOARD_TIMEOUT_MS",
                value: "0".to_string(),
            });
        }

        if self.dashboard.trend_months == 0 || self.dashboard.trend_months > MAX_DASHBOARD_TREND_MONTHS
        {
            return Err(ConfigError::InvalidValue {
                field: "DASHBOARD_TREND_MONTHS",
                value: self.dashboard.trend_months.to_string(),
            });
        }

        if self.dashboard.top_n < 1 || self.dashboard.top_n > MAX_DASHBOARD_TOP_N {
            return Err(ConfigError::InvalidValue {
                field: "DASHBOARD_TOP_N",
                value: self.dashboard.top_n.to_string(),
            });
        }

        if self.security.algorithm != "HS256" {
            return Err(ConfigError::InvalidValue {
                field: "ALGORITHM",
                value: self.security.algorithm.clone(),
            });
        }

        if !(self.runtime.strict_config || self.runtime.environment.is_production()) {
            return Ok(());
        }

        if self.database.database_url.is_none() && self.database.postgres_password.is_empty() {
            return Err(ConfigError::MissingSecret("POSTGRES_PASSWORD"));
        }

        Ok(())
    }
}

fn validate_risk(risk: &RiskSettings) -> Result<(), ConfigError> {
    let ascending = 0.0 < risk.medium_threshold
        && risk.medium_threshold < risk.high_threshold
        && risk.high_threshold < risk.critical_threshold
        && risk.critical_threshold <= 100.0;
    if !ascending {
        return Err(ConfigError::InvalidValue {
            field: "RISK_*_THRESHOLD",
            value: format!(
                "{}/{}/{}",
                risk.medium_threshold, risk.high_threshold, risk.critical_threshold
            ),
        });
    }

    for (field, weight) in [
        ("RISK_ABSENCE_RATE_WEIGHT", risk.absence_rate_weight),
        ("RISK_SUBJECT_STREAK_WEIGHT", risk.subject_streak_weight),
        ("RISK_FULL_DAY_STREAK_WEIGHT", risk.full_day_streak_weight),
    ] {
        if weight < 0.0 {
            return Err(ConfigError::InvalidValue { field, value: weight.to_string() });
        }
    }

    if !(0.0..=100.0).contains(&risk.absence_rate_limit) {
        return Err(ConfigError::InvalidValue {
            field: "ALERT_ABSENCE_RATE_LIMIT",
            value: risk.absence_rate_limit.to_string(),
        });
    }

    if risk.subject_streak_limit == 0 || risk.full_day_streak_limit == 0 {
        return Err(ConfigError::InvalidValue {
            field: "ALERT_*_STREAK_LIMIT",
            value: format!("{}/{}", risk.subject_streak_limit, risk.full_day_streak_limit),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::validate_risk;
    use crate::core::config::RiskSettings;

    #[test]
    fn default_risk_settings_are_valid() {
        assert!(validate_risk(&RiskSettings::default()).is_ok());
    }

    #[test]
    fn thresholds_must_ascend() {
        let risk = RiskSettings { high_threshold: 20.0, ..RiskSettings::default() };
        assert!(validate_risk(&risk).is_err());

        let risk = RiskSettings { critical_threshold: 120.0, ..RiskSettings::default() };
        assert!(validate_risk(&risk).is_err());
    }

    #[test]
    fn negative_weight_rejected() {
        let risk = RiskSettings { subject_streak_weight: -1.0, ..RiskSettings::default() };
        assert!(validate_risk(&risk).is_err());
    }

    #[test]
    fn zero_streak_limit_rejected() {
        let risk = RiskSettings { full_day_streak_limit: 0, ..RiskSettings::default() };
        assert!(validate_risk(&risk).is_err());
    }
}
