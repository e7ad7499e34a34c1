// DeepSeek-R1-Distill-Qwen meal-planner model (4-bit GGUF)
use std::sync::Mutex;
use std::time::Instant;

use candle::quantized::gguf_file;
use candle::{Device, Tensor};
use candle_transformers::generation::LogitsProcessor;
use candle_transformers::models::quantized_qwen2::ModelWeights;
use hf_hub::api::sync::ApiBuilder;
use hf_hub::{Repo, RepoType};
use tokenizers::Tokenizer;

use crate::config::{device, MealPlanConfig};

const BOS_TOKEN: &str = "<｜begin▁of▁sentence｜>";
const EOS_TOKEN: &str = "<｜end▁of▁sentence｜>";
const USER_TOKEN: &str = "<｜User｜>";
const ASSISTANT_TOKEN: &str = "<｜Assistant｜>";

// Greedy decoding: the seed only feeds the LogitsProcessor's unused RNG
const SEED: u64 = 42;
const REPEAT_PENALTY: f32 = 1.1;

/// Wrap the (system, user) pair in the DeepSeek role-tagged chat format.
pub fn apply_chat_template(system: &str, user: &str) -> String {
    format!("{BOS_TOKEN}{system}{USER_TOKEN}{user}{ASSISTANT_TOKEN}")
}

pub struct DeepseekInferenceModel {
    // Generation mutates the KV caches, so requests serialize on this lock
    model: Mutex<ModelWeights>,
    tokenizer: Tokenizer,
    device: Device,
}

impl DeepseekInferenceModel {
    pub fn load_from_hub(config: &MealPlanConfig) -> anyhow::Result<Self> {
        // Configure the API client; the token comes from HF_TOKEN
        let api = ApiBuilder::new()
            .with_token(config.hf_token.clone())
            .build()?;

        // Quantized weights and tokenizer live in different repos
        let weights_repo = api.repo(Repo::with_revision(
            config.weights_id.clone(),
            RepoType::Model,
            "main".to_string(),
        ));
        let model_filename = weights_repo.get(&config.weights_filename)?;

        let tokenizer_repo = api.repo(Repo::with_revision(
            config.tokenizer_id.clone(),
            RepoType::Model,
            "main".to_string(),
        ));
        let tokenizer_filename = tokenizer_repo.get("tokenizer.json")?;
        let tokenizer = Tokenizer::from_file(tokenizer_filename).map_err(anyhow::Error::msg)?;

        let device = device();
        let mut model_file = std::fs::File::open(&model_filename)?;
        let content = gguf_file::Content::read(&mut model_file)?;
        let model = ModelWeights::from_gguf(content, &mut model_file, &device)?;
        log::info!(
            "loaded {} ({}) on {:?}",
            config.weights_id,
            config.weights_filename,
            device
        );

        Ok(Self {
            model: Mutex::new(model),
            tokenizer,
            device,
        })
    }

    /// Generate a meal plan for the chat-formatted (system, user) pair.
    ///
    /// Deterministic decoding with repetition penalty 1.1, stopping early on
    /// the end-of-sequence token. Returns the decoded output sequences; with
    /// batch size 1 that is a single string covering prompt and completion,
    /// special tokens skipped.
    pub fn generate(
        &self,
        system: &str,
        user: &str,
        max_new_tokens: usize,
    ) -> anyhow::Result<Vec<String>> {
        let prompt = apply_chat_template(system, user);
        let mut tokens = self
            .tokenizer
            .encode(prompt, false)
            .map_err(anyhow::Error::msg)?
            .get_ids()
            .to_vec();
        let prompt_token_len = tokens.len();

        let eos_token_id = self.tokenizer.token_to_id(EOS_TOKEN);

        // No temperature / top-p: sampling falls back to argmax
        let mut logits_processor = LogitsProcessor::new(SEED, None, None);

        let mut model = self
            .model
            .lock()
            .map_err(|_| anyhow::anyhow!("model lock poisoned"))?;

        let start_gen = Instant::now();
        let mut index_pos = 0;
        for index in 0..max_new_tokens {
            // Full prompt on the first pass, then one token at a time
            let (context_size, context_index) = if index > 0 {
                (1, index_pos)
            } else {
                (tokens.len(), 0)
            };

            let ctxt = &tokens[tokens.len().saturating_sub(context_size)..];
            let input = Tensor::new(ctxt, &self.device)?.unsqueeze(0)?;
            let logits = model.forward(&input, context_index)?.squeeze(0)?;

            // Penalty applies over the whole history, prompt included
            let logits =
                candle_transformers::utils::apply_repeat_penalty(&logits, REPEAT_PENALTY, &tokens)?;

            index_pos += ctxt.len();

            let next_token = logits_processor.sample(&logits)?;
            tokens.push(next_token);

            if Some(next_token) == eos_token_id {
                break;
            }
        }

        let dt = start_gen.elapsed();
        let generated = tokens.len() - prompt_token_len;
        log::info!(
            "{} tokens generated ({:.2} token/s)",
            generated,
            generated as f64 / dt.as_secs_f64(),
        );

        let output = self
            .tokenizer
            .decode(&tokens, true)
            .map_err(anyhow::Error::msg)?;

        Ok(vec![output])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_template_wraps_roles() {
        let prompt = apply_chat_template("plan meals", "rice and beans");

        assert!(prompt.starts_with(BOS_TOKEN));
        assert!(prompt.ends_with(ASSISTANT_TOKEN));
        let user_at = prompt.find(USER_TOKEN).unwrap();
        assert!(prompt.find("plan meals").unwrap() < user_at);
        assert!(prompt.find("rice and beans").unwrap() > user_at);
    }

    #[test]
    fn test_chat_template_is_deterministic() {
        let a = apply_chat_template("s", "u");
        let b = apply_chat_template("s", "u");
        assert_eq!(a, b);
    }
}
