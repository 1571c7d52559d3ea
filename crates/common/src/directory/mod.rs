//! Actor directory lookups
//!
//! Read-only name resolution for students and supervisors. Used to enrich
//! responses for display; authorization never consults it.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::db::models::{Actor, ActorKind};
use crate::errors::Result;

#[async_trait]
pub trait ActorDirectory: Send + Sync {
    /// `None` when the id is unknown
    async fn resolve(&self, id: Uuid) -> Result<Option<Actor>>;

    /// Resolve many ids at once; unknown ids are absent from the map
    async fn resolve_many(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, Actor>> {
        let mut found = HashMap::with_capacity(ids.len());
        for id in ids {
            if found.contains_key(id) {
                continue;
            }
            if let Some(actor) = self.resolve(*id).await? {
                found.insert(*id, actor);
            }
        }
        Ok(found)
    }
}

#[derive(Default)]
pub struct InMemoryActorDirectory {
    actors: RwLock<HashMap<Uuid, Actor>>,
}

impl InMemoryActorDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, name: &str, kind: ActorKind) -> Actor {
        let actor = Actor {
            id: Uuid::new_v4(),
            name: name.to_string(),
            kind,
            created_at: chrono::Utc::now().into(),
        };
        self.actors.write().await.insert(actor.id, actor.clone());
        actor
    }
}

#[async_trait]
impl ActorDirectory for InMemoryActorDirectory {
    async fn resolve(&self, id: Uuid) -> Result<Option<Actor>> {
        Ok(self.actors.read().await.get(&id).cloned())
    }
}
