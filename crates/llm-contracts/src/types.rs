// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    #[serde(rename = "openai")]
    OpenAI,
    Anthropic,
    Groq,
    Ollama,
    Gemini,
    /// OpenAI models hosted on Azure or a compatible inference gateway.
    Azure,
}

impl Provider {
    pub const ALL: [Self; 6] = [
        Self::OpenAI,
        Self::Anthropic,
        Self::Groq,
        Self::Ollama,
        Self::Gemini,
        Self::Azure,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OpenAI => "openai",
            Self::Anthropic => "anthropic",
            Self::Groq => "groq",
            Self::Ollama => "ollama",
            Self::Gemini => "gemini",
            Self::Azure => "azure",
        }
    }

    /// Environment variable holding the API key, `None` for keyless local providers.
    pub const fn env_key(self) -> Option<&'static str> {
        match self {
            Self::OpenAI => Some("OPENAI_API_KEY"),
            Self::Anthropic => Some("ANTHROPIC_API_KEY"),
            Self::Groq => Some("GROQ_API_KEY"),
            Self::Ollama => None,
            Self::Gemini => Some("GEMINI_API_KEY"),
            Self::Azure => Some("AZURE_OPENAI_API_KEY"),
        }
    }

    pub const fn requires_key(self) -> bool {
        self.env_key().is_some()
    }

    pub const fn default_endpoint(self) -> &'static str {
        match self {
            Self::OpenAI => "https://api.openai.com/v1/chat/completions",
            Self::Anthropic => "https://api.anthropic.com/v1/messages",
            Self::Groq => "https://api.groq.com/openai/v1/chat/completions",
            Self::Ollama => "http://localhost:11434",
            Self::Gemini => "https://generativelanguage.googleapis.com/v1beta",
            Self::Azure => "https://models.github.ai/inference/chat/completions",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = LLMError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" | "open_ai" => Ok(Self::OpenAI),
            "anthropic" | "claude" => Ok(Self::Anthropic),
            "groq" => Ok(Self::Groq),
            "ollama" => Ok(Self::Ollama),
            "gemini" | "google" => Ok(Self::Gemini),
            "azure" | "azure_openai" => Ok(Self::Azure),
            other => Err(LLMError::Configuration(format!(
                "Unsupported provider '{other}'. Supported providers: openai, anthropic, groq, ollama, gemini, azure"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyName {
    #[default]
    RoundRobin,
    CostOptimized,
    Performance,
    #[serde(alias = "fallback_chain")]
    Fallback,
}

impl StrategyName {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RoundRobin => "round_robin",
            Self::CostOptimized => "cost_optimized",
            Self::Performance => "performance",
            Self::Fallback => "fallback",
        }
    }
}

impl FromStr for StrategyName {
    type Err = LLMError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "round_robin" | "roundrobin" => Ok(Self::RoundRobin),
            "cost_optimized" | "cost" => Ok(Self::CostOptimized),
            "performance" | "performance_optimized" => Ok(Self::Performance),
            "fallback" | "fallback_chain" => Ok(Self::Fallback),
            other => Err(LLMError::Configuration(format!(
                "Unknown selection strategy '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Error)]
pub enum LLMError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Rate limit exceeded")]
    RateLimit,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Serialisation error: {0}")]
    Serialisation(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Timeout error")]
    Timeout,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl LLMError {
    /// Errors worth retrying against the same endpoint.
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimit | Self::Network(_) | Self::Timeout | Self::Provider(_)
        )
    }

    pub const fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication(_))
    }
}

pub type LLMResult<T> = Result<T, LLMError>;
