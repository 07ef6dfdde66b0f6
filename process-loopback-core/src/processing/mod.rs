pub mod warmup;
pub mod wav_format;
