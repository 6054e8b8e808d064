use crate::fields::normalize_wire_type;
use crate::schema::SchemaDescriptor;
use serde::Serialize;

/// Discrepancies between a declared schema and the live table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchemaDiff {
    /// Declared but missing from the table
    pub added_in_model: Vec<String>,
    /// Present in the table but no longer declared
    pub removed_from_model: Vec<String>,
    pub type_mismatch: Vec<String>,
    pub pk_mismatch: Vec<String>,
}

impl SchemaDiff {
    pub fn is_empty(&self) -> bool {
        self.added_in_model.is_empty()
            && self.removed_from_model.is_empty()
            && self.type_mismatch.is_empty()
            && self.pk_mismatch.is_empty()
    }
}

/// Compare a declared schema against the live one, field by field
pub fn diff_schemas(declared: &SchemaDescriptor, live: &SchemaDescriptor) -> SchemaDiff {
    let mut diff = SchemaDiff::default();

    for (name, field) in declared.fields() {
        match live.field(name) {
            None => diff.added_in_model.push(name.to_string()),
            Some(live_field) => {
                let model_type = normalize_wire_type(field.wire_type_name());
                let db_type = normalize_wire_type(live_field.wire_type_name());
                if model_type != db_type {
                    diff.type_mismatch.push(format!(
                        "Field '{}': model ({}) != database ({})",
                        name,
                        field.wire_type_name(),
                        live_field.wire_type_name()
                    ));
                }
            }
        }
    }

    diff.removed_from_model = live
        .fields()
        .filter(|(name, _)| !declared.has_field(name))
        .map(|(name, _)| name.to_string())
        .collect();

    let declared_pk = declared.primary_keys();
    let live_pk = live.primary_keys();
    if declared_pk != live_pk {
        diff.pk_mismatch.push(format!(
            "Primary key: model ({}) != database ({})",
            declared_pk.join(", "),
            live_pk.join(", ")
        ));
    }

    diff
}
