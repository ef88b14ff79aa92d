//! Target field declarations supplied by the caller before generation.

use serde::{Deserialize, Serialize};

use super::error::SpinneretError;

/// Scalar kind a scraped field is declared as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Number,
    Boolean,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Number => "number",
            FieldKind::Boolean => "boolean",
        }
    }
}

impl std::str::FromStr for FieldKind {
    type Err = SpinneretError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "str" | "string" => Ok(FieldKind::Text),
            "number" | "int" | "float" => Ok(FieldKind::Number),
            "boolean" | "bool" => Ok(FieldKind::Boolean),
            other => Err(SpinneretError::InvalidFieldSpec(format!(
                "unknown field kind: {other}"
            ))),
        }
    }
}

/// One requested field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub kind: FieldKind,
}

/// Ordered set of fields the generated spider must extract.
///
/// Order is preserved because it is meaningful to the synthesizer prompt
/// and to the output item definition. Immutable once constructed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    fields: Vec<Field>,
}

impl FieldSpec {
    /// Hard cap on fields per scraper.
    pub const MAX_FIELDS: usize = 20;

    /// Build a validated spec from (name, kind) pairs.
    ///
    /// Rejects empty specs, duplicate names, empty names, and specs over
    /// [`Self::MAX_FIELDS`].
    pub fn new(pairs: Vec<(String, FieldKind)>) -> Result<Self, SpinneretError> {
        if pairs.is_empty() {
            return Err(SpinneretError::InvalidFieldSpec(
                "at least one field is required".to_string(),
            ));
        }
        if pairs.len() > Self::MAX_FIELDS {
            return Err(SpinneretError::InvalidFieldSpec(format!(
                "{} fields requested, maximum is {}",
                pairs.len(),
                Self::MAX_FIELDS
            )));
        }

        let mut fields = Vec::with_capacity(pairs.len());
        for (name, kind) in pairs {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(SpinneretError::InvalidFieldSpec(
                    "field name must not be empty".to_string(),
                ));
            }
            if fields.iter().any(|f: &Field| f.name == name) {
                return Err(SpinneretError::InvalidFieldSpec(format!(
                    "duplicate field name: {name}"
                )));
            }
            fields.push(Field { name, kind });
        }

        Ok(Self { fields })
    }

    /// Parse `name:kind` entries, e.g. `price:number`.
    pub fn parse_entries(entries: &[String]) -> Result<Self, SpinneretError> {
        let mut pairs = Vec::with_capacity(entries.len());
        for entry in entries {
            let (name, kind) = entry.split_once(':').ok_or_else(|| {
                SpinneretError::InvalidFieldSpec(format!(
                    "expected name:kind, got {entry}"
                ))
            })?;
            pairs.push((name.to_string(), kind.parse()?));
        }
        Self::new(pairs)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(names: &[&str]) -> Vec<(String, FieldKind)> {
        names.iter().map(|n| (n.to_string(), FieldKind::Text)).collect()
    }

    #[test]
    fn test_field_spec_preserves_order() {
        let spec = FieldSpec::new(pairs(&["title", "price", "url"])).unwrap();
        let names: Vec<_> = spec.names().collect();
        assert_eq!(names, vec!["title", "price", "url"]);
    }

    #[test]
    fn test_field_spec_rejects_empty() {
        assert!(FieldSpec::new(vec![]).is_err());
    }

    #[test]
    fn test_field_spec_rejects_duplicates() {
        let err = FieldSpec::new(pairs(&["price", "price"])).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_field_spec_rejects_over_limit() {
        let unique: Vec<(String, FieldKind)> = (0..=FieldSpec::MAX_FIELDS)
            .map(|i| (format!("field_{i}"), FieldKind::Text))
            .collect();
        assert!(FieldSpec::new(unique).is_err());
    }

    #[test]
    fn test_parse_entries() {
        let spec = FieldSpec::parse_entries(&[
            "title:text".to_string(),
            "price:number".to_string(),
            "in_stock:bool".to_string(),
        ])
        .unwrap();
        assert_eq!(spec.len(), 3);
        assert!(spec.contains("in_stock"));
    }

    #[test]
    fn test_parse_entries_bad_kind() {
        let err =
            FieldSpec::parse_entries(&["title:blob".to_string()]).unwrap_err();
        assert!(err.to_string().contains("unknown field kind"));
    }

    #[test]
    fn test_field_kind_serde() {
        let json = serde_json::to_string(&FieldKind::Number).unwrap();
        assert_eq!(json, "\"number\"");
    }
}
