pub mod blip;
pub mod deepseek;
