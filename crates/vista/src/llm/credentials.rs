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

use dotenvy::dotenv;
use llm_contracts::{LLMError, LLMResult, Provider};
use std::collections::HashMap;
use std::fmt;
use std::sync::{OnceLock, PoisonError, RwLock};
use tracing::debug;

/// API keys held in memory for the lifetime of the session. Never persisted.
#[derive(Clone, Default)]
pub struct Credentials {
    keys: HashMap<Provider, String>,
}

impl Credentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads each provider's key variable (`OPENAI_API_KEY`, `GEMINI_API_KEY`, ...), loading `.env` first.
    pub fn from_env() -> Self {
        dotenv().ok();
        let mut credentials = Self::new();
        for provider in Provider::ALL {
            let Some(var) = provider.env_key() else {
                continue;
            };
            if let Ok(value) = std::env::var(var) {
                if !value.trim().is_empty() {
                    debug!(%provider, "Loaded API key from environment");
                    credentials.keys.insert(provider, value.trim().to_string());
                }
            }
        }
        credentials
    }

    pub fn set_api_key(&mut self, provider: Provider, key: impl Into<String>) -> LLMResult<()> {
        let key = key.into();
        if !provider.requires_key() {
            return Err(LLMError::Configuration(format!(
                "{provider} runs locally and does not use an API key"
            )));
        }
        if key.trim().is_empty() {
            return Err(LLMError::Authentication(format!(
                "API key for {provider} must not be blank"
            )));
        }
        self.keys.insert(provider, key.trim().to_string());
        Ok(())
    }

    pub fn with_api_key(mut self, provider: Provider, key: impl Into<String>) -> LLMResult<Self> {
        self.set_api_key(provider, key)?;
        Ok(self)
    }

    pub fn api_key(&self, provider: Provider) -> Option<&str> {
        self.keys.get(&provider).map(String::as_str)
    }

    /// Keyless providers are always usable.
    pub fn is_usable(&self, provider: Provider) -> bool {
        !provider.requires_key() || self.keys.contains_key(&provider)
    }

    pub fn require(&self, provider: Provider) -> LLMResult<&str> {
        self.api_key(provider).ok_or_else(|| {
            LLMError::Authentication(format!(
                "No API key configured for {provider}. Set {} or call set_api_key",
                provider.env_key().unwrap_or("the provider key")
            ))
        })
    }

    pub fn configured_providers(&self) -> Vec<Provider> {
        let mut providers: Vec<Provider> = self.keys.keys().copied().collect();
        providers.sort();
        providers
    }

    /// Keys in `other` take precedence.
    pub fn merge(&mut self, other: &Self) {
        for (provider, key) in &other.keys {
            self.keys.insert(*provider, key.clone());
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("providers", &self.configured_providers())
            .finish()
    }
}

fn session_store() -> &'static RwLock<Credentials> {
    static STORE: OnceLock<RwLock<Credentials>> = OnceLock::new();
    STORE.get_or_init(|| RwLock::new(Credentials::new()))
}

/// Process-wide explicit key used by the free functions.
pub fn set_session_api_key(provider: Provider, key: impl Into<String>) -> LLMResult<()> {
    let mut store = session_store()
        .write()
        .unwrap_or_else(PoisonError::into_inner);
    store.set_api_key(provider, key)
}

pub fn clear_session_keys() {
    let mut store = session_store()
        .write()
        .unwrap_or_else(PoisonError::into_inner);
    *store = Credentials::new();
}

/// Environment keys overlaid with keys set through [`set_session_api_key`].
pub fn session_credentials() -> Credentials {
    let mut credentials = Credentials::from_env();
    let store = session_store()
        .read()
        .unwrap_or_else(PoisonError::into_inner);
    credentials.merge(&store);
    credentials
}
