// Meal-plan service entry point
use actix_cors::Cors;
use actix_web::{web, App, HttpServer};

use foodwaste_inference::api::{get_meal_plan, health};
use foodwaste_inference::config::MealPlanConfig;
use foodwaste_inference::state::MealPlanState;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let config = MealPlanConfig::from_env();
    let listen_addr = config.listen_addr;
    let shared_state = web::Data::new(MealPlanState::new(config));

    // Warm the model before accepting requests so bad credentials or an
    // unreachable hub fail the process at startup
    shared_state
        .model()
        .expect("Failed to load DeepseekInferenceModel");
    log::info!("meal-plan server listening on {}", listen_addr);

    HttpServer::new(move || {
        App::new()
            .wrap(Cors::permissive())
            .app_data(shared_state.clone())
            .service(get_meal_plan)
            .service(health)
    })
    .bind(listen_addr)?
    .run()
    .await
}
