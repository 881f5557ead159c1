//! Diagnostic round trips through a running proxy.
//!
//! `rune smoke vision` sends one example image URL to `/vision`;
//! `rune smoke transcribe` uploads a synthetic one-second tone to
//! `/audio/transcriptions`. Both print the HTTP status and the extracted
//! text. Neither is part of the pipeline.

use anyhow::{Context, Result};
use hound::{SampleFormat, WavSpec, WavWriter};
use reqwest::multipart;
use serde_json::{json, Value};
use std::f32::consts::PI;
use std::io::Cursor;
use std::time::Duration;

use crate::config::GatewayConfig;
use crate::gateway::{extract_response_text, parse_transcription, IMAGE_CAPTION_PROMPT};

pub const DEFAULT_IMAGE_URL: &str =
    "https://upload.wikimedia.org/wikipedia/commons/3/3f/Fronalpstock_big.jpg";

const TONE_SAMPLE_RATE: u32 = 16_000;
const TONE_FREQUENCY_HZ: f32 = 440.0;
const TONE_AMPLITUDE: f32 = 0.3;

/// Status and extracted text of one smoke call.
#[derive(Debug, Clone)]
pub struct SmokeReport {
    pub status: u16,
    pub text: String,
    /// Raw body, for printing when no text was extracted.
    pub body: String,
}

impl SmokeReport {
    fn from_body(status: u16, body: String, extract: fn(&Value) -> String) -> Self {
        let text = serde_json::from_str::<Value>(&body)
            .map(|json| extract(&json))
            .unwrap_or_default();
        Self { status, text, body }
    }
}

fn client(config: &GatewayConfig) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?)
}

fn endpoint(config: &GatewayConfig, path: &str) -> String {
    format!("{}/{}", config.base_url.trim_end_matches('/'), path)
}

/// Caption a remote image through the proxy.
pub async fn smoke_vision(config: &GatewayConfig, image_url: &str) -> Result<SmokeReport> {
    let body = json!({
        "model": config.chat_model,
        "messages": [{
            "role": "user",
            "content": [
                { "type": "text", "text": IMAGE_CAPTION_PROMPT },
                { "type": "image_url", "image_url": { "url": image_url } },
            ],
        }],
    });

    let url = endpoint(config, "vision");
    let response = client(config)?
        .post(&url)
        .json(&body)
        .send()
        .await
        .with_context(|| format!("POST {} failed", url))?;
    let status = response.status().as_u16();
    let text = response.text().await?;
    Ok(SmokeReport::from_body(status, text, extract_response_text))
}

/// Transcribe a synthetic tone through the proxy.
pub async fn smoke_transcribe(config: &GatewayConfig) -> Result<SmokeReport> {
    let wav = sine_wav(1000).context("failed to synthesize test tone")?;
    let part = multipart::Part::bytes(wav)
        .file_name("tone.wav")
        .mime_str("audio/wav")?;
    let form = multipart::Form::new()
        .part("file", part)
        .text("model", config.chat_model.clone())
        .text("prompt", "Transcribe any speech. Describe the sound if there is none.");

    let url = endpoint(config, "audio/transcriptions");
    let response = client(config)?
        .post(&url)
        .multipart(form)
        .send()
        .await
        .with_context(|| format!("POST {} failed", url))?;
    let status = response.status().as_u16();
    let text = response.text().await?;
    Ok(SmokeReport::from_body(status, text, parse_transcription))
}

/// A mono 16-bit 440 Hz WAV of `duration_ms` milliseconds.
pub fn sine_wav(duration_ms: u64) -> Result<Vec<u8>, hound::Error> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: TONE_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut buf = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut buf, spec)?;
        let total = (TONE_SAMPLE_RATE as u64 * duration_ms) / 1000;
        let amplitude = TONE_AMPLITUDE * i16::MAX as f32;
        for i in 0..total {
            let t = i as f32 / TONE_SAMPLE_RATE as f32;
            writer.write_sample(((2.0 * PI * TONE_FREQUENCY_HZ * t).sin() * amplitude) as i16)?;
        }
        writer.finalize()?;
    }
    Ok(buf.into_inner())
}
