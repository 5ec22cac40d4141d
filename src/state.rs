use anyhow::{anyhow, Result};
use std::sync::Arc;

use crate::notification::notification_service::NotificationService;
use crate::realtime::NotificationHub;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub notification_service: NotificationService,
    pub hub: NotificationHub,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub jwt_secret: String,
    pub internal_api_token: Option<String>,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub host: String,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            jwt_secret: std::env::var("JWT_SECRET")
                .map_err(|_| anyhow!("JWT_SECRET must be set"))?,
            internal_api_token: non_empty_var("INTERNAL_API_TOKEN"),
            database_url: non_empty_var("DATABASE_URL"),
            db_max_connections: std::env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .map_err(|e| anyhow!("DB_MAX_CONNECTIONS must be a number: {}", e))?,
            host: std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|e| anyhow!("PORT must be a port number: {}", e))?,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}
