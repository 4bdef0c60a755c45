//! Field Model
//!
//! Declarative tree describing which columns are totals, rates, quantities,
//! other additive drivers or reconciliation terms, and how a total
//! decomposes into `rate * quantity (+ other)`.

use crate::error::{PvmError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::hash::{Hash, Hasher};

/// Role a field plays in the bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Total,
    Rate,
    Quantity,
    Other,
    Reconciliation,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Total => "total",
            FieldKind::Rate => "rate",
            FieldKind::Quantity => "quantity",
            FieldKind::Other => "other",
            FieldKind::Reconciliation => "reconciliation",
        }
    }
}

/// A node of the field tree. The name doubles as the column name.
///
/// Equality and hashing only look at `(name, kind)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Field {
    name: String,
    kind: FieldKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    components: Vec<Field>,
}

impl Field {
    pub fn new(name: impl Into<String>, kind: FieldKind, components: Vec<Field>) -> Self {
        Self {
            name: name.into(),
            kind,
            components,
        }
    }

    pub fn total(name: impl Into<String>, components: Vec<Field>) -> Self {
        Self::new(name, FieldKind::Total, components)
    }

    pub fn rate(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Rate, Vec::new())
    }

    pub fn quantity(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Quantity, Vec::new())
    }

    pub fn other(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Other, Vec::new())
    }

    pub fn reconciliation(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Reconciliation, Vec::new())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    pub fn components(&self) -> &[Field] {
        &self.components
    }

    pub fn is_leaf(&self) -> bool {
        self.components.is_empty()
    }

    /// The single Rate component of a decomposable field
    pub fn rate_component(&self) -> Result<&Field> {
        self.required_component(FieldKind::Rate)
    }

    /// The single Quantity component of a decomposable field
    pub fn quantity_component(&self) -> Result<&Field> {
        self.required_component(FieldKind::Quantity)
    }

    pub fn other_components(&self) -> impl Iterator<Item = &Field> {
        self.components
            .iter()
            .filter(|c| c.kind == FieldKind::Other)
    }

    fn required_component(&self, kind: FieldKind) -> Result<&Field> {
        required_component(&self.name, &self.components, kind)
    }
}

/// Find the single component of `kind` among `components` of field `owner`
pub fn required_component<'a>(
    owner: &str,
    components: &'a [Field],
    kind: FieldKind,
) -> Result<&'a Field> {
    let mut matching = components.iter().filter(|c| c.kind == kind);
    let first = matching.next().ok_or_else(|| {
        PvmError::MalformedFieldModel(format!(
            "field '{}' is missing required {} component",
            owner,
            kind.as_str()
        ))
    })?;
    if matching.next().is_some() {
        return Err(PvmError::MalformedFieldModel(format!(
            "field '{}' has more than one {} component",
            owner,
            kind.as_str()
        )));
    }
    Ok(first)
}

impl PartialEq for Field {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.kind == other.kind
    }
}

impl Eq for Field {}

impl Hash for Field {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.kind.hash(state);
    }
}

/// Flattened view of a field tree: name -> components (`None` for leaves),
/// in pre-order.
#[derive(Debug, Clone)]
pub struct FlatFields {
    root: Field,
    entries: Vec<(String, Option<Vec<Field>>)>,
}

impl FlatFields {
    pub fn from_root(root: Field) -> Result<Self> {
        if root.kind != FieldKind::Total {
            return Err(PvmError::MalformedFieldModel(format!(
                "root field '{}' must be a total, found {}",
                root.name,
                root.kind.as_str()
            )));
        }

        let mut entries = Vec::new();
        let mut seen = HashSet::new();
        flatten_into(&root, &mut entries, &mut seen)?;

        Ok(Self { root, entries })
    }

    pub fn root(&self) -> &Field {
        &self.root
    }

    pub fn entries(&self) -> &[(String, Option<Vec<Field>>)] {
        &self.entries
    }

    /// Every field name of the tree
    pub fn calculation_fields(&self) -> Vec<String> {
        self.entries.iter().map(|(name, _)| name.clone()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&Option<Vec<Field>>> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, components)| components)
    }
}

fn flatten_into(
    field: &Field,
    entries: &mut Vec<(String, Option<Vec<Field>>)>,
    seen: &mut HashSet<String>,
) -> Result<()> {
    if !seen.insert(field.name.clone()) {
        return Err(PvmError::MalformedFieldModel(format!(
            "field name '{}' appears more than once",
            field.name
        )));
    }

    if field.components.is_empty() {
        entries.push((field.name.clone(), None));
    } else {
        entries.push((field.name.clone(), Some(field.components.clone())));
        for component in &field.components {
            flatten_into(component, entries, seen)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn revenue_tree() -> Field {
        Field::total(
            "revenue",
            vec![
                Field::rate("price"),
                Field::quantity("quantity"),
                Field::other("freight"),
            ],
        )
    }

    #[test]
    fn test_flatten_preorder() {
        let flat = FlatFields::from_root(revenue_tree()).unwrap();
        assert_eq!(
            flat.calculation_fields(),
            vec!["revenue", "price", "quantity", "freight"]
        );
        assert_eq!(flat.get("revenue").unwrap().as_ref().unwrap().len(), 3);
        assert!(flat.get("price").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let tree = Field::total("revenue", vec![Field::rate("x"), Field::quantity("x")]);
        let err = FlatFields::from_root(tree).unwrap_err();
        assert!(matches!(err, PvmError::MalformedFieldModel(_)));
    }

    #[test]
    fn test_missing_quantity_is_reported() {
        let tree = Field::total("revenue", vec![Field::rate("price")]);
        let err = tree.quantity_component().unwrap_err();
        assert!(err.to_string().contains("missing required quantity"));
    }

    #[test]
    fn test_equality_ignores_components() {
        let a = Field::total("revenue", vec![Field::rate("price")]);
        let b = Field::total("revenue", Vec::new());
        assert_eq!(a, b);
        assert_ne!(Field::rate("revenue"), b);
    }

    #[test]
    fn test_deserialize_tree() {
        let json = r#"{
            "name": "revenue",
            "kind": "total",
            "components": [
                {"name": "price", "kind": "rate"},
                {"name": "quantity", "kind": "quantity"}
            ]
        }"#;
        let field: Field = serde_json::from_str(json).unwrap();
        assert_eq!(field.rate_component().unwrap().name(), "price");
        assert_eq!(field.quantity_component().unwrap().name(), "quantity");
    }
}
