/// Field key collision handling
///
/// Several physical fields can share a name (an attribute and a resource
/// attribute both called `service`, a string and a number both called
/// `duration`). This module merges duplicate keys within one query and
/// resolves a single key against the metadata store. Every change is
/// reported as a human-readable action.
use crate::services::FieldKeys;
use filterql::{FieldContext, FieldDataType, TelemetryFieldKey};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBy {
    pub key: TelemetryFieldKey,
    #[serde(default)]
    pub direction: OrderDirection,
}

impl OrderBy {
    pub fn new(key: TelemetryFieldKey, direction: OrderDirection) -> Self {
        Self { key, direction }
    }
}

/// The keys a query selects, groups and orders by
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryKeys {
    #[serde(default)]
    pub select_fields: Vec<TelemetryFieldKey>,
    #[serde(default)]
    pub group_by: Vec<TelemetryFieldKey>,
    #[serde(default)]
    pub order: Vec<OrderBy>,
}

fn record(actions: &mut Vec<String>, action: String) {
    debug!(action = %action, "field key adjusted");
    actions.push(action);
}

/// Merge keys that share a name across select fields, group by and order by.
///
/// The first occurrence of a name is widened (its context or data type set
/// to unspecified) whenever a later occurrence disagrees. Every list then
/// uses the merged key and drops repeats of a name within the same list.
/// Repeats in ORDER BY keep the first direction.
pub fn adjust_duplicate_keys(query: &mut QueryKeys) -> Vec<String> {
    let mut actions = Vec::new();
    let mut merged: HashMap<String, TelemetryFieldKey> = HashMap::new();

    let all_keys = query
        .select_fields
        .iter()
        .chain(query.group_by.iter())
        .chain(query.order.iter().map(|o| &o.key));
    for key in all_keys {
        let Some(existing) = merged.get_mut(&key.name) else {
            merged.insert(key.name.clone(), key.clone());
            continue;
        };
        if existing.field_context.is_specified() && existing.field_context != key.field_context {
            record(
                &mut actions,
                format!(
                    "Removed field context from {} for duplicate key {}",
                    existing, key
                ),
            );
            existing.field_context = FieldContext::Unspecified;
        }
        if existing.field_data_type.is_specified()
            && existing.field_data_type != key.field_data_type
        {
            record(
                &mut actions,
                format!(
                    "Removed field data type from {} for duplicate key {}",
                    existing, key
                ),
            );
            existing.field_data_type = FieldDataType::Unspecified;
        }
    }

    query.select_fields = dedup_list(
        &query.select_fields,
        &merged,
        "SelectField",
        &mut actions,
        |k| k,
        |_, k| k,
    );
    query.group_by = dedup_list(
        &query.group_by,
        &merged,
        "GroupBy",
        &mut actions,
        |k| k,
        |_, k| k,
    );
    query.order = dedup_list(
        &query.order,
        &merged,
        "OrderBy",
        &mut actions,
        |o| &o.key,
        |o, key| OrderBy::new(key, o.direction),
    );

    actions
}

fn dedup_list<T>(
    items: &[T],
    merged: &HashMap<String, TelemetryFieldKey>,
    label: &str,
    actions: &mut Vec<String>,
    key_of: impl Fn(&T) -> &TelemetryFieldKey,
    rebuild: impl Fn(&T, TelemetryFieldKey) -> T,
) -> Vec<T> {
    let mut seen = HashSet::new();
    let mut kept = Vec::with_capacity(items.len());
    for item in items {
        let key = key_of(item);
        if !seen.insert(key.name.clone()) {
            record(actions, format!("Skipped duplicate {} key {}", label, key));
            continue;
        }
        let merged_key = merged.get(&key.name).cloned().unwrap_or_else(|| key.clone());
        kept.push(rebuild(item, merged_key));
    }
    kept
}

fn matches_constraints(key: &TelemetryFieldKey, candidate: &TelemetryFieldKey) -> bool {
    (!key.field_context.is_specified() || key.field_context == candidate.field_context)
        && (!key.field_data_type.is_specified() || key.field_data_type == candidate.field_data_type)
}

/// Resolve one key against the metadata store.
///
/// An intrinsic or calculated field wins when no metadata key with the same
/// name disagrees with it. Otherwise the candidates that satisfy the key's
/// explicit context and data type decide: none leaves the key as written
/// but not materialized, one is adopted outright, and several only fill in
/// the attributes they all agree on.
pub fn adjust_key(
    key: &mut TelemetryFieldKey,
    keys: &FieldKeys,
    intrinsic: Option<&TelemetryFieldKey>,
) -> Vec<String> {
    let mut actions = Vec::new();
    let same_name = keys.get(&key.name).map(Vec::as_slice).unwrap_or_default();

    if let Some(intrinsic) = intrinsic {
        let disagreement = same_name.iter().any(|k| {
            k.field_context != intrinsic.field_context
                || k.field_data_type != intrinsic.field_data_type
        });
        if !disagreement && matches_constraints(key, intrinsic) {
            if key != intrinsic {
                record(
                    &mut actions,
                    format!("Overriding key: {} to {}", key, intrinsic),
                );
                *key = intrinsic.clone();
            }
            return actions;
        }
    }

    let mut matching: Vec<&TelemetryFieldKey> = same_name
        .iter()
        .filter(|k| matches_constraints(key, k))
        .collect();
    if key.field_context.is_specified() {
        let prefixed = format!("{}.{}", key.field_context, key.name);
        if let Some(candidates) = keys.get(&prefixed) {
            matching.extend(candidates.iter().filter(|k| {
                !key.field_data_type.is_specified() || key.field_data_type == k.field_data_type
            }));
        }
    }

    match matching.as_slice() {
        [] => {
            key.materialized = false;
        }
        [only] => {
            let adjusted = (*only).clone();
            if !adjusted.same_field(key) || adjusted.materialized != key.materialized {
                record(
                    &mut actions,
                    format!("Adjusting key {} to {}", key, adjusted),
                );
            }
            *key = adjusted;
        }
        [first, rest @ ..] => {
            if !key.field_context.is_specified()
                && rest.iter().all(|k| k.field_context == first.field_context)
            {
                record(
                    &mut actions,
                    format!(
                        "Adjusting key {} to have field context {}",
                        key, first.field_context
                    ),
                );
                key.field_context = first.field_context;
            }
            if !key.field_data_type.is_specified()
                && rest.iter().all(|k| k.field_data_type == first.field_data_type)
            {
                record(
                    &mut actions,
                    format!(
                        "Adjusting key {} to have data type {}",
                        key, first.field_data_type
                    ),
                );
                key.field_data_type = first.field_data_type;
            }
            if key.json_data_type.is_none()
                && rest.iter().all(|k| k.json_data_type == first.json_data_type)
            {
                key.json_data_type = first.json_data_type;
            }
            key.materialized = matching.iter().all(|k| k.materialized);
        }
    }

    actions
}

/// Resolve every key of a query, then merge the duplicates that remain.
pub fn adjust_keys(
    query: &mut QueryKeys,
    keys: &FieldKeys,
    intrinsic_for: impl Fn(&str) -> Option<TelemetryFieldKey>,
) -> Vec<String> {
    let mut actions = Vec::new();
    let all_keys = query
        .select_fields
        .iter_mut()
        .chain(query.group_by.iter_mut())
        .chain(query.order.iter_mut().map(|o| &mut o.key));
    for key in all_keys {
        let intrinsic = intrinsic_for(&key.name);
        actions.extend(adjust_key(key, keys, intrinsic.as_ref()));
    }
    actions.extend(adjust_duplicate_keys(query));
    actions
}
