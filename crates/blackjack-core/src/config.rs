use std::env;
use std::time::Duration;

/// Configuration for the collaborators the core talks to (the Balance/Rating RPC, the event
/// bus, the JWT secret) and the transport deadlines the server applies to a session. Read
/// directly from the environment at startup, the same direct `env::var` idiom `poker-server::main`
/// uses for `STATIC_DIR`/`PORT` (see SPEC_FULL.md §6.5).
#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub jwt_secret: String,
    pub balance_service_url: String,
    pub nats_hosts: String,
    pub nats_game_result_subject: String,
    pub ranked_mmr_range: i64,
    pub ws_path: String,
    pub ws_read_timeout: Duration,
    pub ws_write_timeout: Duration,
    pub ws_idle_timeout: Duration,
    pub server_shutdown_timeout: Duration,
}

impl CoreConfig {
    pub fn from_env() -> Result<Self, String> {
        let jwt_secret =
            env::var("JWT_SECRET").map_err(|_| "JWT_SECRET must be set".to_string())?;
        let balance_service_url = env::var("BALANCE_SERVICE_URL")
            .map_err(|_| "BALANCE_SERVICE_URL must be set".to_string())?;
        let nats_hosts = env::var("NATS_HOSTS").unwrap_or_else(|_| "localhost:4222".to_string());
        let nats_game_result_subject =
            env::var("NATS_GAME_RESULT_SUBJECT").unwrap_or_else(|_| "game.result".to_string());
        let ranked_mmr_range = env::var("RANKED_MMR_RANGE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(100);
        let ws_path = env::var("WS_PATH").unwrap_or_else(|_| "/ws".to_string());

        Ok(CoreConfig {
            jwt_secret,
            balance_service_url,
            nats_hosts,
            nats_game_result_subject,
            ranked_mmr_range,
            ws_path,
            ws_read_timeout: duration_secs_var("WS_READ_TIMEOUT_SECS", 60),
            ws_write_timeout: duration_secs_var("WS_WRITE_TIMEOUT_SECS", 10),
            ws_idle_timeout: duration_secs_var("WS_IDLE_TIMEOUT_SECS", 120),
            server_shutdown_timeout: duration_secs_var("SERVER_SHUTDOWN_TIMEOUT_SECS", 15),
        })
    }
}

fn duration_secs_var(key: &str, default_secs: u64) -> Duration {
    let secs = env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default_secs);
    Duration::from_secs(secs)
}
