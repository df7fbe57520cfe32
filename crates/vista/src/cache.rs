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

use crate::recommender::{RankingMode, Suggestion};
use llm_contracts::ModelRoute;
use moka::future::Cache;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// In-memory TTL cache of ranked suggestion lists.
#[derive(Debug, Clone)]
pub struct RecommendationCache {
    inner: Cache<String, Arc<Vec<Suggestion>>>,
}

impl RecommendationCache {
    pub fn new(capacity: u64, ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// SHA-256 over everything that changes the ranking.
    pub fn key(fingerprint: &str, count: usize, mode: RankingMode, models: &[ModelRoute]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(fingerprint.as_bytes());
        hasher.update(count.to_le_bytes());
        hasher.update([mode as u8]);
        for route in models {
            hasher.update(route.label().as_bytes());
            hasher.update([0u8]);
        }
        hex::encode(hasher.finalize())
    }

    pub async fn get(&self, key: &str) -> Option<Arc<Vec<Suggestion>>> {
        let hit = self.inner.get(key).await;
        debug!(key = %&key[..12.min(key.len())], hit = hit.is_some(), "Recommendation cache lookup");
        hit
    }

    pub async fn insert(&self, key: String, suggestions: Vec<Suggestion>) {
        self.inner.insert(key, Arc::new(suggestions)).await;
    }

    pub fn invalidate_all(&self) {
        self.inner.invalidate_all();
    }

    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }
}
