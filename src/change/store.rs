//! Change Store (§3, §6): durable persistence of Changes and their embedded
//! patch sets, reviewers, comments and approvals. The Change Store
//! exclusively owns Change records (Ownership, §3) -- every mutation in this
//! crate goes through [`ChangeStore`], never around it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use tokio::sync::RwLock;

use crate::change::entity;
use crate::change::model::Change;
use crate::server::error::ServerError;

/// Storage seam for Changes. Reads may be non-transactional; writes must be
/// transactional per-row (§5 "Shared resources").
#[async_trait]
pub trait ChangeStore: Send + Sync {
    async fn next_id(&self) -> Result<i64, ServerError>;

    async fn find_by_key(
        &self,
        project_name: &str,
        change_key: &str,
    ) -> Result<Option<Change>, ServerError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<Change>, ServerError>;

    /// Insert a brand new Change. Fails with [`ServerError::AlreadyExists`]
    /// if `(project_name, change_key)` is already taken.
    async fn insert(&self, change: Change) -> Result<Change, ServerError>;

    /// Persist a mutated Change (new patch set, status transition, review
    /// activity, ...). Fails with [`ServerError::NotFound`] if the change
    /// does not already exist.
    async fn update(&self, change: Change) -> Result<Change, ServerError>;
}

/// In-memory [`ChangeStore`] used by tests and by embedders that don't need
/// durability (the spec treats the storage engine itself as an external
/// collaborator; this and [`SeaOrmChangeStore`] are the two seams).
#[derive(Default)]
pub struct InMemoryChangeStore {
    next_id: AtomicI64,
    changes: RwLock<HashMap<i64, Change>>,
}

impl InMemoryChangeStore {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            changes: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl ChangeStore for InMemoryChangeStore {
    async fn next_id(&self) -> Result<i64, ServerError> {
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn find_by_key(
        &self,
        project_name: &str,
        change_key: &str,
    ) -> Result<Option<Change>, ServerError> {
        let changes = self.changes.read().await;
        Ok(changes
            .values()
            .find(|c| c.project_name == project_name && c.change_key == change_key)
            .cloned())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Change>, ServerError> {
        Ok(self.changes.read().await.get(&id).cloned())
    }

    async fn insert(&self, change: Change) -> Result<Change, ServerError> {
        let mut changes = self.changes.write().await;
        if changes
            .values()
            .any(|c| c.project_name == change.project_name && c.change_key == change.change_key)
        {
            return Err(ServerError::AlreadyExists(format!(
                "change {} already exists in {}",
                change.change_key, change.project_name
            )));
        }
        changes.insert(change.id, change.clone());
        Ok(change)
    }

    async fn update(&self, change: Change) -> Result<Change, ServerError> {
        let mut changes = self.changes.write().await;
        if !changes.contains_key(&change.id) {
            return Err(ServerError::NotFound(format!(
                "change {} not found",
                change.id
            )));
        }
        changes.insert(change.id, change.clone());
        Ok(change)
    }
}

/// `sea-orm`-backed [`ChangeStore`]. Patch sets, metadata and approvals are
/// stored as JSON document columns (§6); the typed [`Change`] is the only
/// shape the rest of the crate ever sees.
pub struct SeaOrmChangeStore {
    db: DatabaseConnection,
}

impl SeaOrmChangeStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

fn model_to_change(model: entity::Model) -> Result<Change, ServerError> {
    let status = match model.status.as_str() {
        "NEW" => crate::change::model::ChangeStatus::New,
        "MERGED" => crate::change::model::ChangeStatus::Merged,
        "ABANDONED" => crate::change::model::ChangeStatus::Abandoned,
        other => return Err(ServerError::Internal(format!("unknown status {other}"))),
    };
    let patch_sets = serde_json::from_str(&model.patch_sets_json)
        .map_err(|e| ServerError::Internal(format!("corrupt patch_sets_json: {e}")))?;
    let metadata = serde_json::from_str(&model.metadata_json)
        .map_err(|e| ServerError::Internal(format!("corrupt metadata_json: {e}")))?;
    let approvals = serde_json::from_str(&model.approvals_json)
        .map_err(|e| ServerError::Internal(format!("corrupt approvals_json: {e}")))?;

    Ok(Change {
        id: model.id,
        change_key: model.change_key,
        project_name: model.project_name,
        dest_branch: model.dest_branch,
        subject: model.subject,
        topic: model.topic,
        status,
        owner_account_id: model.owner_account_id,
        current_patch_set_number: model.current_patch_set_number as u32,
        created_on: model.created_on,
        last_updated_on: model.last_updated_on,
        patch_sets,
        metadata,
        approvals,
    })
}

fn change_to_active_model(change: &Change) -> Result<entity::ActiveModel, ServerError> {
    let status = match change.status {
        crate::change::model::ChangeStatus::New => "NEW",
        crate::change::model::ChangeStatus::Merged => "MERGED",
        crate::change::model::ChangeStatus::Abandoned => "ABANDONED",
    };
    Ok(entity::ActiveModel {
        id: Set(change.id),
        change_key: Set(change.change_key.clone()),
        project_name: Set(change.project_name.clone()),
        dest_branch: Set(change.dest_branch.clone()),
        subject: Set(change.subject.clone()),
        topic: Set(change.topic.clone()),
        status: Set(status.to_string()),
        owner_account_id: Set(change.owner_account_id.clone()),
        current_patch_set_number: Set(change.current_patch_set_number as i32),
        created_on: Set(change.created_on),
        last_updated_on: Set(change.last_updated_on),
        patch_sets_json: Set(serde_json::to_string(&change.patch_sets)
            .map_err(|e| ServerError::Internal(e.to_string()))?),
        metadata_json: Set(serde_json::to_string(&change.metadata)
            .map_err(|e| ServerError::Internal(e.to_string()))?),
        approvals_json: Set(serde_json::to_string(&change.approvals)
            .map_err(|e| ServerError::Internal(e.to_string()))?),
    })
}

#[async_trait]
impl ChangeStore for SeaOrmChangeStore {
    async fn next_id(&self) -> Result<i64, ServerError> {
        let max = entity::Entity::find()
            .all(&self.db)
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))?
            .into_iter()
            .map(|m| m.id)
            .max()
            .unwrap_or(0);
        Ok(max + 1)
    }

    async fn find_by_key(
        &self,
        project_name: &str,
        change_key: &str,
    ) -> Result<Option<Change>, ServerError> {
        let model = entity::Entity::find()
            .filter(entity::Column::ProjectName.eq(project_name.to_string()))
            .filter(entity::Column::ChangeKey.eq(change_key.to_string()))
            .one(&self.db)
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))?;
        model.map(model_to_change).transpose()
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Change>, ServerError> {
        let model = entity::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))?;
        model.map(model_to_change).transpose()
    }

    async fn insert(&self, change: Change) -> Result<Change, ServerError> {
        if self
            .find_by_key(&change.project_name, &change.change_key)
            .await?
            .is_some()
        {
            return Err(ServerError::AlreadyExists(format!(
                "change {} already exists in {}",
                change.change_key, change.project_name
            )));
        }
        let active = change_to_active_model(&change)?;
        active
            .insert(&self.db)
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))?;
        Ok(change)
    }

    async fn update(&self, change: Change) -> Result<Change, ServerError> {
        if self.find_by_id(change.id).await?.is_none() {
            return Err(ServerError::NotFound(format!(
                "change {} not found",
                change.id
            )));
        }
        let active = change_to_active_model(&change)?;
        active
            .update(&self.db)
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))?;
        Ok(change)
    }
}
