// API routes and handlers
use actix_multipart::Multipart;
use actix_web::{get, post, web, HttpResponse, Responder};
use futures_util::TryStreamExt;
use serde::Serialize;

use crate::prompt::build_meal_plan_prompt;
use crate::state::{CaptionState, MealPlanState};

#[derive(Serialize)]
pub struct CaptionResponse {
    caption: String,
}

#[derive(Serialize)]
pub struct MealPlanResponse {
    meal_plan: Vec<String>,
}

#[get("/health")]
pub async fn health() -> impl Responder {
    "ok"
}

#[post("/api/post_left_over/")]
pub async fn post_left_over(
    state: web::Data<CaptionState>,
    payload: Multipart,
) -> impl Responder {
    let file_bytes = match read_upload(payload).await {
        Ok(bytes) => bytes,
        Err(e) => {
            log::error!("Error reading upload: {:?}", e);
            return HttpResponse::BadRequest().body("Failed to read uploaded file");
        }
    };

    let model = match state.model() {
        Ok(model) => model,
        Err(e) => {
            log::error!("Error loading caption model: {:?}", e);
            return HttpResponse::InternalServerError().body("Failed to load caption model");
        }
    };

    match model.caption(&file_bytes) {
        Ok(caption) => HttpResponse::Ok().json(CaptionResponse { caption }),
        Err(e) => {
            log::error!("Error generating caption: {:?}", e);
            HttpResponse::InternalServerError().body("Failed to generate caption")
        }
    }
}

#[get("/api/get_meal_plan")]
pub async fn get_meal_plan(
    state: web::Data<MealPlanState>,
    query: web::Query<Vec<(String, String)>>,
) -> impl Responder {
    let (all_food, pref_foods) = collect_food_params(query.into_inner());
    let (system, user) = build_meal_plan_prompt(&all_food, &pref_foods);

    let model = match state.model() {
        Ok(model) => model,
        Err(e) => {
            log::error!("Error loading meal-plan model: {:?}", e);
            return HttpResponse::InternalServerError().body("Failed to load meal-plan model");
        }
    };

    match model.generate(&system, &user, state.config.max_new_tokens) {
        Ok(meal_plan) => HttpResponse::Ok().json(MealPlanResponse { meal_plan }),
        Err(e) => {
            log::error!("Error generating meal plan: {:?}", e);
            HttpResponse::InternalServerError().body("Failed to generate meal plan")
        }
    }
}

/// Split the repeated `all_food` / `pref_foods` query keys into the two
/// ordered lists; unknown keys are ignored.
fn collect_food_params(pairs: Vec<(String, String)>) -> (Vec<String>, Vec<String>) {
    let mut all_food = Vec::new();
    let mut pref_foods = Vec::new();
    for (key, value) in pairs {
        match key.as_str() {
            "all_food" => all_food.push(value),
            "pref_foods" => pref_foods.push(value),
            _ => {}
        }
    }
    (all_food, pref_foods)
}

/// Drain the multipart upload into memory. No size bound is enforced here.
async fn read_upload(mut payload: Multipart) -> anyhow::Result<Vec<u8>> {
    let mut bytes = Vec::new();
    if let Some(mut field) = payload
        .try_next()
        .await
        .map_err(|e| anyhow::anyhow!("multipart error: {e}"))?
    {
        while let Some(chunk) = field
            .try_next()
            .await
            .map_err(|e| anyhow::anyhow!("multipart error: {e}"))?
        {
            bytes.extend_from_slice(&chunk);
        }
    }
    if bytes.is_empty() {
        anyhow::bail!("empty upload");
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_food_params_keeps_order() {
        let pairs = vec![
            ("all_food".to_string(), "rice".to_string()),
            ("pref_foods".to_string(), "chicken".to_string()),
            ("all_food".to_string(), "beans".to_string()),
            ("ignored".to_string(), "x".to_string()),
        ];

        let (all_food, pref_foods) = collect_food_params(pairs);
        assert_eq!(all_food, vec!["rice", "beans"]);
        assert_eq!(pref_foods, vec!["chicken"]);
    }

    #[test]
    fn test_collect_food_params_empty() {
        let (all_food, pref_foods) = collect_food_params(Vec::new());
        assert!(all_food.is_empty());
        assert!(pref_foods.is_empty());
    }
}
