use std::env;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub database_url: String,
    pub allowed_origins: Vec<String>,
    pub secret_key: String,
    pub access_token_expire_minutes: i64,
    pub otp_length: usize,
    pub registration_otp_expiry_secs: u64,
    pub llm_base_url: String,
    pub llm_model: String,
    pub llm_timeout_secs: u64,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: String,
    pub environment: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, String> {
        // Load .env file if it exists (development)
        dotenvy::dotenv().ok();

        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let server_port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .map_err(|_| "Invalid SERVER_PORT")?;

        let database_url =
            env::var("DATABASE_URL").map_err(|_| "DATABASE_URL must be set".to_string())?;

        let allowed_origins = env::var("ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .collect();

        let secret_key = env::var("SECRET_KEY")
            .map_err(|_| "SECRET_KEY must be set for access token signing".to_string())?;

        let access_token_expire_minutes = env::var("ACCESS_TOKEN_EXPIRE_MINUTES")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .map_err(|_| "Invalid ACCESS_TOKEN_EXPIRE_MINUTES")?;

        let otp_length = env::var("OTP_LENGTH")
            .unwrap_or_else(|_| "6".to_string())
            .parse()
            .map_err(|_| "Invalid OTP_LENGTH")?;

        let registration_otp_expiry_secs = env::var("REGISTRATION_OTP_EXPIRY_SECONDS")
            .unwrap_or_else(|_| "300".to_string())
            .parse()
            .map_err(|_| "Invalid REGISTRATION_OTP_EXPIRY_SECONDS")?;

        let llm_base_url =
            env::var("LLM_BASE_URL").unwrap_or_else(|_| "http://127.0.0.1:1234".to_string());

        let llm_model =
            env::var("LLM_MODEL").unwrap_or_else(|_| "meta-llama-3.1-8b-instruct".to_string());

        let llm_timeout_secs = env::var("LLM_TIMEOUT_SECS")
            .unwrap_or_else(|_| "300".to_string())
            .parse()
            .map_err(|_| "Invalid LLM_TIMEOUT_SECS")?;

        let smtp_host = env::var("SMTP_HOST").unwrap_or_else(|_| "smtp.gmail.com".to_string());
        let smtp_port = env::var("SMTP_PORT")
            .unwrap_or_else(|_| "587".to_string())
            .parse()
            .map_err(|_| "Invalid SMTP_PORT")?;
        let smtp_username = env::var("SMTP_USERNAME").unwrap_or_default();
        let smtp_password = env::var("SMTP_PASSWORD").unwrap_or_default();

        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        Ok(Config {
            server_host,
            server_port,
            database_url,
            allowed_origins,
            secret_key,
            access_token_expire_minutes,
            otp_length,
            registration_otp_expiry_secs,
            llm_base_url,
            llm_model,
            llm_timeout_secs,
            smtp_host,
            smtp_port,
            smtp_username,
            smtp_password,
            environment,
        })
    }

    /// Get server address as string
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}
