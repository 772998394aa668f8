//! Composite Value Resolution
//!
//! Resolves a declarative composition config into a single string built from fields of
//! the record bound to a form (or of related records), and coordinates recomputation,
//! staleness and auto-save for one control instance.
//!
//! Key concepts:
//! - Config may point at an environment variable holding the effective JSON
//! - Same-entity configs fetch the bound record by id; related configs filter by a join field
//! - Output is rows joined by a separator, or a `{{field}}` template
//! - Only the most recently started request may change the output
//!
//! # Example config
//!
//! ```json
//! {
//!   "source": "contact",
//!   "sourcefield": "_parentcustomerid_value",
//!   "orderBy": "createdon desc",
//!   "rows": [
//!     [{ "fieldname": "fullname" }],
//!     [{ "fieldname": "emailaddress1", "displayname": "Email: " }]
//!   ]
//! }
//! ```

pub mod autosave;
pub mod builder;
pub mod control;
pub mod error;
pub mod extract;
pub mod literal;
pub mod pipeline;
pub mod plan;
pub mod resolver;
pub mod rows;
pub mod store;
pub mod store_memory;
pub mod truncate;
pub mod types;

pub use autosave::{AutoSave, DEFAULT_AUTO_SAVE_DELAY};
pub use control::{
    Collaborators, CompositeControl, ControlSettings, ControlSnapshot, ControlState,
    UpdateOutcome,
};
pub use error::{CompositeError, StoreError};
pub use pipeline::{Composition, ResolutionPipeline};
pub use plan::{QueryPlan, RelatedQuery, Retrieval};
pub use resolver::{ConfigResolver, EnvironmentCache};
pub use store::{EnvironmentStore, FieldMetadata, RecordStore, SaveTrigger};
pub use types::{BoundInputs, CompositeConfig, EnvironmentDefinition, FieldPart, Record, Row};
