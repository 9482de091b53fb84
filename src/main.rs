use actix_web::{web, App, HttpServer};
use anyhow::Context;
use chrono::Local;
use log::info;
use std::io;
use std::io::Write;

use notaires_pay::config::Config;
use notaires_pay::middleware::{create_cors, RequestLogging};
use notaires_pay::routes::{api_v1_routes, public_routes};
use notaires_pay::state::AppState;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    let mut log_builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    log_builder
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] - {}",
                Local::now().format("%Y-%m-%d %H:%M:%S %:z"),
                record.level(),
                record.args()
            )
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
        })
        .init();

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    let bind_address = config.bind_address();
    let workers = config.server.workers;
    let cors_origins = config.frontend.cors_allowed_origins.clone();

    let app_state = web::Data::new(AppState::from_config(config).await?);

    info!("Starting payment service on {}", bind_address);

    let mut server = HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .wrap(create_cors(&cors_origins))
            .wrap(RequestLogging)
            .service(api_v1_routes())
            .service(public_routes())
    });

    if let Some(workers) = workers {
        server = server.workers(workers);
    }

    server
        .bind(&bind_address)
        .with_context(|| format!("Failed to bind {}", bind_address))?
        .run()
        .await?;

    info!("Payment service stopped");
    Ok(())
}
