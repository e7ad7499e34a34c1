// Shared state management for models
use once_cell::sync::OnceCell;

use crate::config::{CaptionConfig, MealPlanConfig};
use crate::models::blip::BlipCaptionModel;
use crate::models::deepseek::DeepseekInferenceModel;

/// Lazily-initialized model handle. The loader runs at most once per process,
/// even under concurrent first requests; a failed load is not cached, so the
/// next caller retries.
pub struct LazyModel<T> {
    cell: OnceCell<T>,
}

impl<T> LazyModel<T> {
    pub fn new() -> Self {
        Self {
            cell: OnceCell::new(),
        }
    }

    pub fn get_or_load<F>(&self, load: F) -> anyhow::Result<&T>
    where
        F: FnOnce() -> anyhow::Result<T>,
    {
        self.cell.get_or_try_init(load)
    }
}

impl<T> Default for LazyModel<T> {
    fn default() -> Self {
        Self::new()
    }
}

pub struct CaptionState {
    pub config: CaptionConfig,
    model: LazyModel<BlipCaptionModel>,
}

impl CaptionState {
    pub fn new(config: CaptionConfig) -> Self {
        Self {
            config,
            model: LazyModel::new(),
        }
    }

    pub fn model(&self) -> anyhow::Result<&BlipCaptionModel> {
        self.model
            .get_or_load(|| BlipCaptionModel::load_from_hub(&self.config))
    }
}

pub struct MealPlanState {
    pub config: MealPlanConfig,
    model: LazyModel<DeepseekInferenceModel>,
}

impl MealPlanState {
    pub fn new(config: MealPlanConfig) -> Self {
        Self {
            config,
            model: LazyModel::new(),
        }
    }

    pub fn model(&self) -> anyhow::Result<&DeepseekInferenceModel> {
        self.model
            .get_or_load(|| DeepseekInferenceModel::load_from_hub(&self.config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_loader_runs_once_and_returns_same_handle() {
        let loads = AtomicUsize::new(0);
        let model: LazyModel<String> = LazyModel::new();

        let first = model
            .get_or_load(|| {
                loads.fetch_add(1, Ordering::SeqCst);
                Ok("handle".to_string())
            })
            .unwrap() as *const String;
        let second = model
            .get_or_load(|| {
                loads.fetch_add(1, Ordering::SeqCst);
                Ok("other".to_string())
            })
            .unwrap() as *const String;

        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(first, second);
    }

    #[test]
    fn test_failed_load_is_retried() {
        let model: LazyModel<u32> = LazyModel::new();

        let err = model.get_or_load(|| Err(anyhow::anyhow!("no credentials")));
        assert!(err.is_err());

        let ok = model.get_or_load(|| Ok(7)).unwrap();
        assert_eq!(*ok, 7);
    }
}
