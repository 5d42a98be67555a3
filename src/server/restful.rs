use std::sync::Arc;
use std::time::Duration;

use actix_web::web::{self, Data, PayloadConfig};
use actix_web::{App, HttpRequest, HttpResponse, HttpServer};
use anyhow::{Context, Result};
use log::{info, warn};
use openssl::ssl::SslAcceptorBuilder;
use sd_notify::NotifyState;

use super::context::ServerContext;
use super::handlers::{auth, entity, healthz, meta};
use super::response::ErrorResponse;

pub struct RestfulServer {
    ssl: Option<SslAcceptorBuilder>,
    ctx: Arc<ServerContext>,

    keep_alive_secs: Option<u64>,
    workers: Option<u64>,

    bind: String,

    payload_limit_mib: usize,
}

pub const API_PATH: &str = "/v5";
pub const HEALTHZ_PATH: &str = "/healthz";

/// Registers every route of the store. Expects the `Arc<ServerContext>` to
/// be installed as app data.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource(HEALTHZ_PATH).route(web::get().to(healthz::get_healthz)))
        .service(
            web::scope(API_PATH)
                .route("/macaroon", web::get().to(auth::get_macaroon))
                .route(
                    "/delegatable-macaroon",
                    web::get().to(auth::get_delegatable_macaroon),
                )
                .route("/whoami", web::get().to(auth::get_whoami))
                .route("/meta/{endpoint:.*}", web::get().to(meta::get_bulk_meta))
                .route("/{path:.*}", web::get().to(entity::handle_entity))
                .route("/{path:.*}", web::put().to(entity::handle_entity)),
        )
        .default_service(web::route().to(default_handler));
}

async fn default_handler(req: HttpRequest) -> HttpResponse {
    let path = req.uri().path().to_string();
    let method = req.method().as_str().to_string();
    HttpResponse::NotFound().json(ErrorResponse {
        code: String::from("not found"),
        message: format!("no route to {method} {path}"),
    })
}

impl RestfulServer {
    const DEFAULT_PAYLOAD_LIMIT_MIB: usize = 10;

    pub fn new(bind: String, ctx: Arc<ServerContext>) -> Self {
        Self {
            ssl: None,
            ctx,
            keep_alive_secs: None,
            workers: None,
            bind,
            payload_limit_mib: Self::DEFAULT_PAYLOAD_LIMIT_MIB,
        }
    }

    pub fn set_ssl(&mut self, ssl: SslAcceptorBuilder) {
        self.ssl = Some(ssl);
    }

    pub fn set_keep_alive_secs(&mut self, keep_alive_secs: u64) {
        self.keep_alive_secs = Some(keep_alive_secs);
    }

    pub fn set_workers(&mut self, workers: u64) {
        self.workers = Some(workers);
    }

    pub fn set_payload_limit_mib(&mut self, payload_limit_mib: u64) {
        self.payload_limit_mib = payload_limit_mib as usize;
    }

    pub async fn run(mut self) -> Result<()> {
        let ctx = self.ctx.clone();
        let payload_limit = self.payload_limit_mib * 1024 * 1024;
        let mut srv = HttpServer::new(move || {
            App::new()
                .app_data(Data::new(ctx.clone()))
                .app_data(PayloadConfig::new(payload_limit))
                .configure(configure)
        });

        if let Some(ssl) = self.ssl.take() {
            info!("Binding to https://{}", self.bind);
            srv = srv.bind_openssl(&self.bind, ssl).context("bind with ssl")?
        } else {
            warn!("Using HTTP (without SSL). THIS IS DANGEROUS, DO NOT USE IN PRODUCTION");
            info!("Binding to http://{}", self.bind);
            srv = srv.bind(&self.bind).context("bind without ssl")?
        };

        if let Some(keep_alive) = self.keep_alive_secs {
            srv = srv.keep_alive(Duration::from_secs(keep_alive));
        }
        if let Some(workers) = self.workers {
            srv = srv.workers(workers as usize);
        }

        sd_notify::notify(true, &[NotifyState::Ready]).context("notify systemd")?;
        info!("Starting restful server");
        srv.run().await.context("run server")?;

        info!("Server stopped by user");
        Ok(())
    }
}
