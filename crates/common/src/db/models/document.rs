//! Document entity: one row per submitted milestone artifact

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Milestone a document belongs to
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    #[sea_orm(string_value = "concept_proposal")]
    ConceptProposal,
    #[sea_orm(string_value = "research_proposal")]
    ResearchProposal,
    #[sea_orm(string_value = "interim_report_a")]
    InterimReportA,
    #[sea_orm(string_value = "interim_report_b")]
    InterimReportB,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::ConceptProposal => "concept_proposal",
            DocumentKind::ResearchProposal => "research_proposal",
            DocumentKind::InterimReportA => "interim_report_a",
            DocumentKind::InterimReportB => "interim_report_b",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "concept_proposal" => Ok(DocumentKind::ConceptProposal),
            "research_proposal" => Ok(DocumentKind::ResearchProposal),
            "interim_report_a" => Ok(DocumentKind::InterimReportA),
            "interim_report_b" => Ok(DocumentKind::InterimReportB),
            other => Err(format!("unknown document kind '{}'", other)),
        }
    }
}

/// Review status of a document
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "on_review")]
    OnReview,
    #[sea_orm(string_value = "approved")]
    Approved,
    #[sea_orm(string_value = "rejected")]
    Rejected,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::OnReview => "on_review",
            DocumentStatus::Approved => "approved",
            DocumentStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentStatus {
    type Err = String;

    /// Accepts the snake_case wire form and the legacy "on review" spelling.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(' ', "_").as_str() {
            "pending" => Ok(DocumentStatus::Pending),
            "on_review" => Ok(DocumentStatus::OnReview),
            "approved" => Ok(DocumentStatus::Approved),
            "rejected" => Ok(DocumentStatus::Rejected),
            other => Err(format!("unknown status '{}'", other)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "documents")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub kind: DocumentKind,

    /// Submitting student
    pub owner_id: Uuid,

    /// Assigned supervisor; unset until a reviewer is linked
    pub reviewer_id: Option<Uuid>,

    #[sea_orm(column_type = "Text")]
    pub topic: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub note: Option<String>,

    /// Blob key of the initial upload
    #[sea_orm(column_type = "Text")]
    pub file_key: String,

    pub status: DocumentStatus,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    /// Whether `actor_id` is registered on this document in the given role
    pub fn is_linked(&self, actor_id: Uuid, role: super::ActorRole) -> bool {
        match role {
            super::ActorRole::Submitter => self.owner_id == actor_id,
            super::ActorRole::Reviewer => self.reviewer_id == Some(actor_id),
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::cycle_record::Entity")]
    CycleRecords,
}

impl Related<super::cycle_record::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CycleRecords.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parsing_accepts_legacy_spelling() {
        assert_eq!("on review".parse::<DocumentStatus>(), Ok(DocumentStatus::OnReview));
        assert_eq!("ON_REVIEW".parse::<DocumentStatus>(), Ok(DocumentStatus::OnReview));
        assert_eq!("approved".parse::<DocumentStatus>(), Ok(DocumentStatus::Approved));
        assert!("archived".parse::<DocumentStatus>().is_err());
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!(
            "interim-report-a".parse::<DocumentKind>(),
            Ok(DocumentKind::InterimReportA)
        );
        assert_eq!(
            "concept_proposal".parse::<DocumentKind>(),
            Ok(DocumentKind::ConceptProposal)
        );
        assert!("thesis".parse::<DocumentKind>().is_err());
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&DocumentStatus::OnReview).unwrap();
        assert_eq!(json, "\"on_review\"");
    }
}
