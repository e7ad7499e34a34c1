// Service configuration, read from the environment with fixed defaults
use std::env;
use std::net::SocketAddr;

use candle::Device;

const DEFAULT_CAPTION_ADDR: &str = "0.0.0.0:8000";
const DEFAULT_MEALPLAN_ADDR: &str = "0.0.0.0:8001";

/// Configuration for the image-caption service.
#[derive(Debug, Clone)]
pub struct CaptionConfig {
    pub listen_addr: SocketAddr,
    /// Hub repo holding the quantized BLIP weights.
    pub model_id: String,
    pub weights_filename: String,
    /// Hub repo holding tokenizer.json (the GGUF repo does not ship one).
    pub tokenizer_id: String,
    pub hf_token: Option<String>,
}

impl CaptionConfig {
    pub fn from_env() -> Self {
        Self {
            listen_addr: listen_addr("CAPTION_SERVER_ADDR", DEFAULT_CAPTION_ADDR),
            model_id: "lmz/candle-blip".to_string(),
            weights_filename: "blip-image-captioning-large-q4k.gguf".to_string(),
            tokenizer_id: "Salesforce/blip-image-captioning-large".to_string(),
            hf_token: env::var("HF_TOKEN").ok(),
        }
    }
}

/// Configuration for the meal-plan service.
#[derive(Debug, Clone)]
pub struct MealPlanConfig {
    pub listen_addr: SocketAddr,
    /// Hub repo holding the 4-bit GGUF weights.
    pub weights_id: String,
    pub weights_filename: String,
    /// Upstream repo holding tokenizer.json; this is the fetch that needs
    /// HF_TOKEN when the upstream repo is gated.
    pub tokenizer_id: String,
    pub max_new_tokens: usize,
    pub hf_token: Option<String>,
}

impl MealPlanConfig {
    pub fn from_env() -> Self {
        let max_new_tokens = env::var("MAX_NEW_TOKENS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(2000);

        Self {
            listen_addr: listen_addr("MEALPLAN_SERVER_ADDR", DEFAULT_MEALPLAN_ADDR),
            weights_id: "unsloth/DeepSeek-R1-Distill-Qwen-7B-GGUF".to_string(),
            weights_filename: "DeepSeek-R1-Distill-Qwen-7B-Q4_K_M.gguf".to_string(),
            tokenizer_id: "deepseek-ai/DeepSeek-R1-Distill-Qwen-7B".to_string(),
            max_new_tokens,
            hf_token: env::var("HF_TOKEN").ok(),
        }
    }
}

fn listen_addr(var: &str, default: &str) -> SocketAddr {
    env::var(var)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .unwrap_or_else(|_| default.parse().expect("default listen address"))
}

/// Device for model weights: GPU when available, CPU otherwise.
pub fn device() -> Device {
    Device::cuda_if_available(0).unwrap_or(Device::Cpu)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ports() {
        assert_eq!(DEFAULT_CAPTION_ADDR.parse::<SocketAddr>().unwrap().port(), 8000);
        assert_eq!(DEFAULT_MEALPLAN_ADDR.parse::<SocketAddr>().unwrap().port(), 8001);
    }

    #[test]
    fn test_listen_addr_falls_back_on_garbage() {
        std::env::set_var("TEST_LISTEN_ADDR", "not-an-address");
        let addr = listen_addr("TEST_LISTEN_ADDR", "127.0.0.1:9000");
        assert_eq!(addr.port(), 9000);
    }
}
