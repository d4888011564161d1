//! Route table and validation collaborators.

mod routing;
mod validation;

pub use routing::{Params, Route, RouteMatch, RouteTable, SchemaLookup, WILDCARD};
pub use validation::{FieldIssue, FieldSchema, FieldType, Schema, ValidationError};
