/*
 * Copyright (C) 2020 Oakes, Gregory <gregoryoakes@fastmail.com>
 * Author: Oakes, Gregory <gregory.oakes@fastmail.com>
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as
 * published by the Free Software Foundation, either version 3 of the
 * License, or (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program.  If not, see <http://www.gnu.org/licenses/>.
 */

use std::env;

use serde::{Deserialize, Serialize};

use crate::Error;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_MODEL: &str = "gemini-2.0-flash-preview-image-generation";

/// A generated image as normalized from the provider: a mime type plus the
/// base64 encoded bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub mime_type: String,
    pub data: String,
}

impl EncodedImage {
    /// Collapses into the self-describing form stored and served everywhere
    /// else.
    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

/// Client for the hosted image-generation model. One request per
/// generation; failures are never retried here.
#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl Client {
    pub fn new(api_key: impl Into<String>) -> Self {
        Client {
            http: reqwest::Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Reads `GEMINI_API_KEY` (required) plus the optional
    /// `GEMINI_BASE_URL` and `GEMINI_MODEL` overrides.
    pub fn from_env() -> Result<Self, Error> {
        let api_key = env::var("GEMINI_API_KEY")
            .map_err(|_| Error::Config("GEMINI_API_KEY is not set".to_string()))?;
        let mut client = Client::new(api_key);
        if let Ok(base_url) = env::var("GEMINI_BASE_URL") {
            client.base_url = base_url;
        }
        if let Ok(model) = env::var("GEMINI_MODEL") {
            client.model = model;
        }
        Ok(client)
    }

    /// Requests a text+image response for `prompt` and normalizes it into
    /// the first inline image payload.
    pub async fn generate(&self, prompt: &str) -> Result<EncodedImage, Error> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );
        let body = GenerateContentRequest {
            contents: vec![RequestContent {
                parts: vec![RequestPart {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                response_modalities: vec!["TEXT".to_string(), "IMAGE".to_string()],
            },
        };

        let resp = self
            .http
            .post(url.as_str())
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Generation(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::Generation(provider_message(status, &text)));
        }

        let decoded: GenerateContentResponse = resp
            .json()
            .await
            .map_err(|e| Error::Generation(e.to_string()))?;
        first_inline_image(&decoded).ok_or(Error::NoImage)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<RequestContent>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct RequestContent {
    parts: Vec<RequestPart>,
}

#[derive(Serialize)]
struct RequestPart {
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_modalities: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default)]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: Option<String>,
    data: String,
}

/// The first part of the first candidate carrying inline image bytes, if
/// any. The provider may interleave text parts before the image.
fn first_inline_image(resp: &GenerateContentResponse) -> Option<EncodedImage> {
    let content = resp.candidates.first()?.content.as_ref()?;
    content.parts.iter().find_map(|part| {
        part.inline_data.as_ref().map(|inline| EncodedImage {
            mime_type: inline
                .mime_type
                .clone()
                .unwrap_or_else(|| "image/png".to_string()),
            data: inline.data.clone(),
        })
    })
}

#[derive(Deserialize)]
struct ProviderErrorBody {
    error: Option<ProviderError>,
}

#[derive(Deserialize)]
struct ProviderError {
    message: Option<String>,
}

fn provider_message(status: reqwest::StatusCode, body: &str) -> String {
    serde_json::from_str::<ProviderErrorBody>(body)
        .ok()
        .and_then(|b| b.error)
        .and_then(|e| e.message)
        .unwrap_or_else(|| format!("{}: {}", status, body))
}
