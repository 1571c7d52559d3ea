//! SeaORM entity models
//!
//! Database entities for ThesisTrack

mod actor;
mod cycle_record;
mod document;

pub use document::{
    Entity as DocumentEntity,
    Model as Document,
    ActiveModel as DocumentActiveModel,
    Column as DocumentColumn,
    DocumentKind,
    DocumentStatus,
};

pub use cycle_record::{
    Entity as CycleRecordEntity,
    Model as CycleRecord,
    ActiveModel as CycleRecordActiveModel,
    Column as CycleRecordColumn,
    ActorRole,
};

pub use actor::{
    Entity as ActorEntity,
    Model as Actor,
    ActiveModel as ActorActiveModel,
    Column as ActorColumn,
    ActorKind,
};
