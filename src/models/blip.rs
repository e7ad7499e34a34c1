// BLIP image-captioning model (4-bit GGUF)
use std::cmp::Ordering;
use std::sync::Mutex;

use candle::{DType, Device, Tensor};
use candle_transformers::models::{blip, quantized_blip};
use hf_hub::api::sync::ApiBuilder;
use hf_hub::{Repo, RepoType};
use tokenizers::Tokenizer;

use crate::config::{device, CaptionConfig};

// Image processor constants for the BLIP vision tower
const IMAGE_SIZE: usize = 384;
const IMAGE_MEAN: [f32; 3] = [0.48145466, 0.4578275, 0.40821073];
const IMAGE_STD: [f32; 3] = [0.26862954, 0.2613026, 0.2757771];

// Decoder special tokens: [DEC] starts the caption, [SEP] ends it
const BOS_TOKEN_ID: u32 = 30522;
const SEP_TOKEN_ID: u32 = 102;

/// Text the caption is conditioned on; the decoded output keeps it as prefix.
const CAPTION_SEED: &str = "On this plate, there is ";

const NUM_BEAMS: usize = 5;
// Length bounds count the whole decoder sequence, seed included
const MIN_LENGTH: usize = 32;
const MAX_LENGTH: usize = 64;

pub struct BlipCaptionModel {
    // The text decoder's KV cache makes generation &mut
    model: Mutex<quantized_blip::BlipForConditionalGeneration>,
    tokenizer: Tokenizer,
    device: Device,
}

impl BlipCaptionModel {
    pub fn load_from_hub(config: &CaptionConfig) -> anyhow::Result<Self> {
        let api = ApiBuilder::new()
            .with_token(config.hf_token.clone())
            .build()?;

        let weights_repo = api.repo(Repo::with_revision(
            config.model_id.clone(),
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
        let blip_config = blip::Config::image_captioning_large();
        let vb = quantized_blip::VarBuilder::from_gguf(model_filename, &device)?;
        let model = quantized_blip::BlipForConditionalGeneration::new(&blip_config, vb)?;
        log::info!(
            "loaded {} ({}) on {:?}",
            config.model_id,
            config.weights_filename,
            device
        );

        Ok(Self {
            model: Mutex::new(model),
            tokenizer,
            device,
        })
    }

    /// Caption an uploaded image: decode as RGB, run the vision tower once,
    /// then beam-search the text decoder from the fixed caption seed.
    /// Malformed image bytes surface as errors from the decode step.
    pub fn caption(&self, image_bytes: &[u8]) -> anyhow::Result<String> {
        let pixel_values = load_image(image_bytes, &self.device)?;

        let mut model = self
            .model
            .lock()
            .map_err(|_| anyhow::anyhow!("model lock poisoned"))?;
        let image_embeds = pixel_values.unsqueeze(0)?.apply(model.vision_model())?;

        let seed_encoding = self
            .tokenizer
            .encode(CAPTION_SEED, false)
            .map_err(anyhow::Error::msg)?;
        let mut prefix = vec![BOS_TOKEN_ID];
        prefix.extend_from_slice(seed_encoding.get_ids());

        let mut beams = vec![BeamHypothesis {
            tokens: prefix,
            score: 0.0,
            finished: false,
        }];

        // Each round extends every live beam by its top candidates and keeps
        // the best NUM_BEAMS overall; a beam finishes on [SEP] or max length.
        while beams.iter().any(|beam| !beam.finished) {
            let mut candidates: Vec<BeamHypothesis> = Vec::new();
            for beam in &beams {
                if beam.finished || beam.tokens.len() >= MAX_LENGTH {
                    let mut done = beam.clone();
                    done.finished = true;
                    candidates.push(done);
                    continue;
                }

                // Beams diverge token-wise, so the cache is rebuilt from the
                // full prefix on every step
                model.reset_kv_cache();
                let input_ids = Tensor::new(beam.tokens.as_slice(), &self.device)?.unsqueeze(0)?;
                let logits = model.text_decoder().forward(&input_ids, &image_embeds)?;
                let logits = logits.squeeze(0)?;
                let last = logits.get(logits.dim(0)? - 1)?;

                let mut log_probs = log_softmax(&last.to_vec1::<f32>()?);
                if beam.tokens.len() + 1 < MIN_LENGTH {
                    log_probs[SEP_TOKEN_ID as usize] = f32::NEG_INFINITY;
                }

                for (token_id, log_prob) in top_k(&log_probs, NUM_BEAMS) {
                    let mut next = beam.clone();
                    next.score += log_prob as f64;
                    if token_id == SEP_TOKEN_ID {
                        next.finished = true;
                    } else {
                        next.tokens.push(token_id);
                    }
                    candidates.push(next);
                }
            }

            candidates.sort_by(|a, b| {
                b.score
                    .partial_cmp(&a.score)
                    .unwrap_or(Ordering::Equal)
            });
            candidates.truncate(NUM_BEAMS);
            beams = candidates;
        }

        let best = beams
            .into_iter()
            .max_by(|a, b| {
                a.length_normalized_score()
                    .partial_cmp(&b.length_normalized_score())
                    .unwrap_or(Ordering::Equal)
            })
            .ok_or_else(|| anyhow::anyhow!("beam search produced no hypothesis"))?;

        // Skip the [DEC] start token; specials are dropped by the decode
        let caption = self
            .tokenizer
            .decode(&best.tokens[1..], true)
            .map_err(anyhow::Error::msg)?;

        Ok(caption)
    }
}

#[derive(Clone)]
struct BeamHypothesis {
    tokens: Vec<u32>,
    score: f64,
    finished: bool,
}

impl BeamHypothesis {
    fn length_normalized_score(&self) -> f64 {
        self.score / self.tokens.len() as f64
    }
}

/// Decode image bytes as RGB, resize-to-fill to 384x384 and normalize with
/// the BLIP mean/std, yielding a (3, 384, 384) float tensor.
pub fn load_image(bytes: &[u8], device: &Device) -> anyhow::Result<Tensor> {
    let img = image::load_from_memory(bytes)?
        .resize_to_fill(
            IMAGE_SIZE as u32,
            IMAGE_SIZE as u32,
            image::imageops::FilterType::Triangle,
        )
        .to_rgb8();
    let data = img.into_raw();

    let data =
        Tensor::from_vec(data, (IMAGE_SIZE, IMAGE_SIZE, 3), device)?.permute((2, 0, 1))?;
    let mean = Tensor::new(&IMAGE_MEAN, device)?.reshape((3, 1, 1))?;
    let std = Tensor::new(&IMAGE_STD, device)?.reshape((3, 1, 1))?;

    let pixel_values = ((data.to_dtype(DType::F32)? / 255.0)?
        .broadcast_sub(&mean))?
    .broadcast_div(&std)?;
    Ok(pixel_values)
}

fn log_softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let log_sum: f32 = logits
        .iter()
        .map(|&v| (v - max).exp())
        .sum::<f32>()
        .ln();
    logits.iter().map(|&v| v - max - log_sum).collect()
}

/// Top-k token ids with their log-probs, best first.
fn top_k(log_probs: &[f32], k: usize) -> Vec<(u32, f32)> {
    let mut indexed: Vec<(u32, f32)> = log_probs
        .iter()
        .enumerate()
        .map(|(id, &lp)| (id as u32, lp))
        .collect();
    indexed.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    indexed.truncate(k);
    indexed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb([120, 80, 40]));
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn test_load_image_accepts_one_pixel_rgb() {
        let tensor = load_image(&png_bytes(1, 1), &Device::Cpu).unwrap();
        assert_eq!(tensor.dims(), &[3, IMAGE_SIZE, IMAGE_SIZE]);
    }

    #[test]
    fn test_load_image_rejects_garbage() {
        assert!(load_image(b"not an image", &Device::Cpu).is_err());
    }

    #[test]
    fn test_log_softmax_normalizes() {
        let log_probs = log_softmax(&[1.0, 2.0, 3.0]);
        let total: f32 = log_probs.iter().map(|lp| lp.exp()).sum();
        assert!((total - 1.0).abs() < 1e-5);
        assert!(log_probs[2] > log_probs[1] && log_probs[1] > log_probs[0]);
    }

    #[test]
    fn test_top_k_orders_descending() {
        let picked = top_k(&[0.1, 0.9, 0.5, 0.7], 2);
        assert_eq!(picked.len(), 2);
        assert_eq!(picked[0].0, 1);
        assert_eq!(picked[1].0, 3);
    }
}
