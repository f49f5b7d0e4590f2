//! `sea-orm` entity for the Change table. Patch sets, reviewers, comments,
//! drafts and approvals are stored as JSON document columns per §6's
//! "Persisted state layout (logical, not physical)" note ("equivalent
//! normalized layout is acceptable" -- we take the simpler document layout
//! and keep the typed view in [`super::model`]).

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "change")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(indexed)]
    pub change_key: String,
    pub project_name: String,
    pub dest_branch: String,
    pub subject: String,
    pub topic: Option<String>,
    pub status: String,
    pub owner_account_id: String,
    pub current_patch_set_number: i32,
    pub created_on: DateTimeUtc,
    pub last_updated_on: DateTimeUtc,
    /// JSON-encoded `Vec<PatchSet>`.
    pub patch_sets_json: String,
    /// JSON-encoded `ChangeMetadata`.
    pub metadata_json: String,
    /// JSON-encoded `Vec<Approval>`.
    pub approvals_json: String,
}

#[derive(Copy, Clone, Debug, EnumIter)]
pub enum Relation {}

impl RelationTrait for Relation {
    fn def(&self) -> RelationDef {
        panic!("no relations defined on change::Entity")
    }
}

impl ActiveModelBehavior for ActiveModel {}
