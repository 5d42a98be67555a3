use actix_web::HttpResponse;
use chrono::Utc;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthzResponse {
    pub version: String,
    pub timestamp: u64,
}

pub async fn get_healthz() -> HttpResponse {
    HttpResponse::Ok().json(HealthzResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().timestamp() as u64,
    })
}
