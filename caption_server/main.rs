// Caption service entry point
use actix_cors::Cors;
use actix_web::{web, App, HttpServer};

use foodwaste_inference::api::{health, post_left_over};
use foodwaste_inference::config::CaptionConfig;
use foodwaste_inference::state::CaptionState;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let config = CaptionConfig::from_env();
    let listen_addr = config.listen_addr;
    let shared_state = web::Data::new(CaptionState::new(config));

    // Warm the model before accepting requests
    shared_state
        .model()
        .expect("Failed to load BlipCaptionModel");
    log::info!("caption server listening on {}", listen_addr);

    HttpServer::new(move || {
        App::new()
            .wrap(Cors::permissive())
            .app_data(shared_state.clone())
            .service(post_left_over)
            .service(health)
    })
    .bind(listen_addr)?
    .run()
    .await
}
