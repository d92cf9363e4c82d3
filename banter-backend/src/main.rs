mod ai;
mod channels;
mod config;
mod controllers;
mod db;
mod execution;
mod http;
mod models;
mod tools;

use actix_web::{middleware::Logger, web, App, HttpServer};
use ai::{AiClient, ClaudeClient};
use channels::{GenerationOrchestrator, MessageDispatcher, WhatsAppChannel};
use config::Config;
use db::Database;
use dotenv::dotenv;
use execution::CancellationRegistry;
use std::sync::Arc;

pub struct AppState {
    pub config: Config,
    pub dispatcher: Arc<MessageDispatcher>,
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let config = Config::from_env();

    let db = Arc::new(
        Database::new(&config.database_url)
            .unwrap_or_else(|e| panic!("Failed to open database: {}", e)),
    );
    log::info!("[MAIN] Database ready at {}", config.database_url);

    let delivery = Arc::new(WhatsAppChannel::new(
        &config.whatsapp_access_token,
        &config.whatsapp_phone_number_id,
    ));

    let tools = tools::create_default_registry(db.clone(), delivery.clone(), &config.bot_name);

    let claude = ClaudeClient::new(&config.anthropic_api_key, None, Some(&config.ai_model))
        .unwrap_or_else(|e| panic!("Failed to create AI client: {}", e));
    let ai = Arc::new(AiClient::Claude(claude));

    let orchestrator = GenerationOrchestrator::new(
        ai,
        tools,
        &config.bot_name,
        config.max_tool_iterations,
    );

    let cancellations = Arc::new(CancellationRegistry::new());
    let dispatcher = Arc::new(MessageDispatcher::new(
        db,
        cancellations,
        orchestrator,
        delivery,
        &config.bot_name,
        config.history_window,
    ));

    let port = config.port;
    let state = web::Data::new(AppState { config, dispatcher });

    log::info!("[MAIN] Starting server on port {}", port);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(Logger::default())
            .configure(controllers::health::configure)
            .configure(controllers::webhook::configure)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
