use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    /// When unset, listings are cached in process memory.
    pub redis_url: Option<String>,
    pub listings_cache_ttl_secs: u64,
    pub otp_ttl_minutes: i64,
    /// Echo freshly generated OTPs in API responses. Test environments only.
    pub expose_otp: bool,
    pub frontend_url: String,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "harvest-market".into()),
            audience: std::env::var("JWT_AUDIENCE")
                .unwrap_or_else(|_| "harvest-market-users".into()),
            ttl_minutes: env_parse("JWT_TTL_MINUTES").unwrap_or(15),
            refresh_ttl_minutes: env_parse("JWT_REFRESH_TTL_MINUTES").unwrap_or(60 * 24 * 7),
        };
        Ok(Self {
            database_url,
            jwt,
            redis_url: std::env::var("REDIS_URL").ok().filter(|v| !v.is_empty()),
            listings_cache_ttl_secs: env_parse("LISTINGS_CACHE_TTL_SECS").unwrap_or(5 * 60),
            otp_ttl_minutes: env_parse("OTP_TTL_MINUTES").unwrap_or(10),
            expose_otp: env_parse("EXPOSE_OTP").unwrap_or(false),
            frontend_url: std::env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:3000".into()),
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}
