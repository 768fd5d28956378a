use std::collections::HashMap;
use std::sync::Arc;

use reng_types::Recommendation;
use tokio::sync::RwLock;

/// The in-memory set of active recommendations. Single-writer (the
/// tracker); external readers observe copy-on-read snapshots (spec §4.5
/// "Concurrent access").
#[derive(Clone)]
pub struct ActiveSet {
    inner: Arc<RwLock<HashMap<String, Recommendation>>>,
}

impl ActiveSet {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn seed(&self, recommendations: Vec<Recommendation>) {
        let mut guard = self.inner.write().await;
        guard.clear();
        for rec in recommendations {
            guard.insert(rec.id.clone(), rec);
        }
    }

    pub async fn snapshot(&self) -> Vec<Recommendation> {
        self.inner.read().await.values().cloned().collect()
    }

    pub async fn get(&self, id: &str) -> Option<Recommendation> {
        self.inner.read().await.get(id).cloned()
    }

    pub async fn insert(&self, rec: Recommendation) {
        self.inner.write().await.insert(rec.id.clone(), rec);
    }

    pub async fn remove(&self, id: &str) -> Option<Recommendation> {
        self.inner.write().await.remove(id)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }
}

impl Default for ActiveSet {
    fn default() -> Self {
        Self::new()
    }
}
