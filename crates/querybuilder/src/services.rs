/// Storage-specific services injected into the compilers
///
/// The compilers know nothing about physical tables. They ask a
/// `FieldMapper` where a key lives and a `ConditionBuilder` how to compare
/// it, so the same expression can target different schemas.
use crate::error::Result;
use crate::sql::SqlBuilder;
use filterql::{FilterOperator, TelemetryFieldKey, Value};
use std::collections::HashMap;

/// Field keys known to the metadata store, grouped by name
pub type FieldKeys = HashMap<String, Vec<TelemetryFieldKey>>;

pub trait FieldMapper: Send + Sync {
    /// Column expression that reads `key`.
    ///
    /// Returns `QueryBuilderError::ColumnNotFound` when the key's context
    /// has no backing column.
    fn field_for(&self, key: &TelemetryFieldKey) -> Result<String>;

    /// Column expression aliased to the key name, for select lists
    fn column_expression_for(&self, key: &TelemetryFieldKey, keys: &FieldKeys) -> Result<String>;

    /// Expression that reads a path inside the JSON body
    fn json_key_to_field(&self, key: &TelemetryFieldKey) -> Result<String> {
        self.field_for(key)
    }
}

pub trait ConditionBuilder: Send + Sync {
    /// Render `key op value`, binding values through `sb`
    fn condition_for(
        &self,
        key: &TelemetryFieldKey,
        op: FilterOperator,
        value: &Value,
        sb: &mut SqlBuilder,
    ) -> Result<String>;
}
