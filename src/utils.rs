use crate::peer::types::ServerConfig;
use rand::Rng;

pub fn random_id() -> String {
    hex::encode(rand::rng().random::<[u8; 8]>())
}

const ICE_SCHEMES: [&str; 3] = ["stun:", "turn:", "turns:"];

/// URL ICE сервера со схемой. Без схемы подставляется по типу сервера
pub fn add_ice_url_scheme(config: &ServerConfig) -> String {
    if ICE_SCHEMES.iter().any(|s| config.url.starts_with(s)) {
        return config.url.clone();
    }
    match config.r#type.as_str() {
        "turn" => format!("turn:{}", config.url),
        _ => format!("stun:{}", config.url),
    }
}
