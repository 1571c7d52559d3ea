//! Cycle record entity: one immutable row per reviewer or student exchange

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Side of the exchange that produced a cycle record
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    #[sea_orm(string_value = "reviewer")]
    Reviewer,
    #[sea_orm(string_value = "submitter")]
    Submitter,
}

impl ActorRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorRole::Reviewer => "reviewer",
            ActorRole::Submitter => "submitter",
        }
    }
}

impl fmt::Display for ActorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActorRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reviewer" => Ok(ActorRole::Reviewer),
            "submitter" => Ok(ActorRole::Submitter),
            other => Err(format!("unknown actor role '{}'", other)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "cycle_records")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub document_id: Uuid,

    pub actor_id: Uuid,

    pub actor_role: ActorRole,

    /// Position in the document's exchange history, starting at 1.
    /// Unique per document across both roles.
    pub cycle_number: i32,

    #[sea_orm(column_type = "Text")]
    pub file_key: String,

    pub file_size: i64,

    #[sea_orm(column_type = "Text")]
    pub file_sha256: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub note: Option<String>,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::document::Entity",
        from = "Column::DocumentId",
        to = "super::document::Column::Id"
    )]
    Document,
}

impl Related<super::document::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Document.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
