use std::net::SocketAddr;
use std::path::PathBuf;

const DB_PATH: &str = "PINGWARDEN_DB_PATH";

pub fn get_db_path() -> Option<PathBuf> {
    std::env::var(DB_PATH)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .map(PathBuf::from)
}

const BIND_ADDR: &str = "PINGWARDEN_ADDR";

pub fn get_bind_addr() -> Option<SocketAddr> {
    let addr_from_env = std::env::var(BIND_ADDR);
    addr_from_env.ok().and_then(|res| res.parse().ok())
}

/// Cut `value` down to at most `max_chars` characters, marking the cut.
pub fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }

    let head: String = value.chars().take(max_chars).collect();
    format!("{head}...(truncated)")
}
