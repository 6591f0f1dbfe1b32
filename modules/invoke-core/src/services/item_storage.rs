//! Generic keyed storage, instantiated once per stored entity type.

use std::collections::HashMap;
use std::sync::RwLock as StdRwLock;

use async_trait::async_trait;
use invoke_common::{GraphExecutionState, LibraryGraph, PaginatedResults};
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::RwLock;

use super::{read_unpoisoned, write_unpoisoned};
use crate::error::ServiceResult;

/// An entity that can live in an `ItemStorage`.
pub trait StorableItem: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Human-readable kind, used in errors and logs.
    const KIND: &'static str;

    fn item_id(&self) -> &str;
}

impl StorableItem for LibraryGraph {
    const KIND: &'static str = "library graph";

    fn item_id(&self) -> &str {
        &self.id
    }
}

impl StorableItem for GraphExecutionState {
    const KIND: &'static str = "graph execution state";

    fn item_id(&self) -> &str {
        &self.id
    }
}

pub type ChangedListener<T> = Box<dyn Fn(&T) + Send + Sync>;
pub type DeletedListener = Box<dyn Fn(&str) + Send + Sync>;

#[async_trait]
pub trait ItemStorage<T: StorableItem>: Send + Sync {
    async fn get(&self, id: &str) -> ServiceResult<Option<T>>;

    /// Insert or replace by `item_id()`. Fires `on_changed` listeners.
    async fn set(&self, item: T) -> ServiceResult<()>;

    /// Items in insertion order. Pages are zero-based.
    async fn list(&self, page: usize, per_page: usize) -> ServiceResult<PaginatedResults<T>>;

    /// Case-insensitive substring match against the item's JSON form.
    async fn search(&self, query: &str, page: usize, per_page: usize) -> ServiceResult<PaginatedResults<T>>;

    /// Remove an item. Fires `on_deleted` listeners if it existed.
    async fn delete(&self, id: &str) -> ServiceResult<()>;

    /// Listeners run synchronously and must not register further listeners.
    fn on_changed(&self, listener: ChangedListener<T>);

    fn on_deleted(&self, listener: DeletedListener);
}

// ---------------------------------------------------------------------------
// MemoryItemStorage
// ---------------------------------------------------------------------------

pub struct MemoryItemStorage<T> {
    items: RwLock<Items<T>>,
    changed: StdRwLock<Vec<ChangedListener<T>>>,
    deleted: StdRwLock<Vec<DeletedListener>>,
}

struct Items<T> {
    by_id: HashMap<String, T>,
    order: Vec<String>,
}

impl<T: StorableItem> MemoryItemStorage<T> {
    pub fn new() -> Self {
        Self {
            items: RwLock::new(Items {
                by_id: HashMap::new(),
                order: Vec::new(),
            }),
            changed: StdRwLock::new(Vec::new()),
            deleted: StdRwLock::new(Vec::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.items.read().await.order.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn ordered(&self) -> Vec<T> {
        let items = self.items.read().await;
        items
            .order
            .iter()
            .filter_map(|id| items.by_id.get(id).cloned())
            .collect()
    }
}

impl<T: StorableItem> Default for MemoryItemStorage<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: StorableItem> ItemStorage<T> for MemoryItemStorage<T> {
    async fn get(&self, id: &str) -> ServiceResult<Option<T>> {
        Ok(self.items.read().await.by_id.get(id).cloned())
    }

    async fn set(&self, item: T) -> ServiceResult<()> {
        {
            let mut items = self.items.write().await;
            let id = item.item_id().to_string();
            if items.by_id.insert(id.clone(), item.clone()).is_none() {
                items.order.push(id);
            }
        }
        for listener in read_unpoisoned(&self.changed).iter() {
            listener(&item);
        }
        Ok(())
    }

    async fn list(&self, page: usize, per_page: usize) -> ServiceResult<PaginatedResults<T>> {
        Ok(PaginatedResults::paginate(self.ordered().await, page, per_page))
    }

    async fn search(&self, query: &str, page: usize, per_page: usize) -> ServiceResult<PaginatedResults<T>> {
        let needle = query.to_lowercase();
        let mut matching = Vec::new();
        for item in self.ordered().await {
            let haystack = serde_json::to_string(&item)?.to_lowercase();
            if haystack.contains(&needle) {
                matching.push(item);
            }
        }
        Ok(PaginatedResults::paginate(matching, page, per_page))
    }

    async fn delete(&self, id: &str) -> ServiceResult<()> {
        let existed = {
            let mut items = self.items.write().await;
            let existed = items.by_id.remove(id).is_some();
            if existed {
                items.order.retain(|o| o != id);
            }
            existed
        };
        if existed {
            for listener in read_unpoisoned(&self.deleted).iter() {
                listener(id);
            }
        }
        Ok(())
    }

    fn on_changed(&self, listener: ChangedListener<T>) {
        write_unpoisoned(&self.changed).push(listener);
    }

    fn on_deleted(&self, listener: DeletedListener) {
        write_unpoisoned(&self.deleted).push(listener);
    }
}
