use std::env;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_DATABASE_URL: &str = "sqlite:tutorhub.db?mode=rwc";

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
}

impl Config {
    /// Reads configuration from the environment, `.env` included, falling
    /// back to dev defaults with a warning.
    pub fn load() -> Self {
        dotenv::dotenv().ok();

        let port = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or_else(|| {
                tracing::warn!("PORT not set, defaulting to {DEFAULT_PORT}");
                DEFAULT_PORT
            });

        let database_url = env::var("DATABASE_URL").unwrap_or_else(|_| {
            tracing::warn!("DATABASE_URL not set, defaulting to {DEFAULT_DATABASE_URL}");
            DEFAULT_DATABASE_URL.to_string()
        });

        Self { port, database_url }
    }
}
