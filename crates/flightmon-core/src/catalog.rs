//! The variable catalog: every variable the monitor knows how to sample.
//!
//! Built once at startup and read-only afterwards, so lookups need no
//! locking. The source is a text file with one `name,unit` pair per line:
//!
//! ```text
//! # name,unit
//! INDICATED ALTITUDE,feet
//! ATC HEAVY,Bool
//! ATC ID,String8
//! ```
//!
//! Ids are assigned in file order starting at 0. Blank lines and `#`
//! comments are skipped and do not consume an id.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::errors::CatalogError;
use crate::ids::VariableId;
use crate::value::ValueKind;

/// Definition of one catalog variable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VariableDef {
    /// Stable id.
    pub id: VariableId,
    /// Unique name, as the provider spells it.
    pub name: String,
    /// Physical unit or type tag.
    pub unit: String,
    /// Value kind derived from `unit`.
    pub kind: ValueKind,
}

impl VariableDef {
    /// Build a definition, deriving the kind from the unit.
    pub fn new(id: VariableId, name: impl Into<String>, unit: impl Into<String>) -> Self {
        let unit = unit.into();
        Self {
            id,
            name: name.into(),
            kind: ValueKind::from_unit(&unit),
            unit,
        }
    }

    /// Unit to declare when registering with the provider. String variables
    /// must be registered without a unit.
    pub fn registration_unit(&self) -> &str {
        if self.kind.is_string() { "" } else { &self.unit }
    }
}

/// Immutable name→variable and id→variable table.
#[derive(Debug, Default)]
pub struct VariableCatalog {
    by_id: Vec<Arc<VariableDef>>,
    by_name: HashMap<String, Arc<VariableDef>>,
}

impl VariableCatalog {
    /// Load the catalog from a file.
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let text = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let catalog = Self::parse(&text)?;
        debug!(?path, variables = catalog.len(), "catalog loaded");
        Ok(catalog)
    }

    /// Parse catalog text.
    pub fn parse(text: &str) -> Result<Self, CatalogError> {
        let mut pairs = Vec::new();
        for (idx, raw_line) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((name, unit)) = line.rsplit_once(',') else {
                return Err(CatalogError::Malformed {
                    line: line_no,
                    reason: "expected `name,unit`".into(),
                });
            };
            let (name, unit) = (name.trim(), unit.trim());
            if name.is_empty() {
                return Err(CatalogError::Malformed {
                    line: line_no,
                    reason: "empty variable name".into(),
                });
            }
            if unit.is_empty() {
                return Err(CatalogError::Malformed {
                    line: line_no,
                    reason: format!("empty unit for {name:?}"),
                });
            }
            pairs.push((line_no, name, unit));
        }
        Self::build(pairs)
    }

    /// Build a catalog from `(name, unit)` pairs in id order.
    pub fn from_pairs<'a, I>(pairs: I) -> Result<Self, CatalogError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        Self::build(
            pairs
                .into_iter()
                .enumerate()
                .map(|(idx, (name, unit))| (idx + 1, name, unit)),
        )
    }

    fn build<'a, I>(entries: I) -> Result<Self, CatalogError>
    where
        I: IntoIterator<Item = (usize, &'a str, &'a str)>,
    {
        let mut catalog = Self::default();
        for (line, name, unit) in entries {
            if catalog.by_name.contains_key(name) {
                return Err(CatalogError::DuplicateName {
                    name: name.to_string(),
                    line,
                });
            }
            let raw_id = u32::try_from(catalog.by_id.len()).map_err(|_| {
                CatalogError::TooManyVariables {
                    max: u64::from(u32::MAX),
                }
            })?;
            let def = Arc::new(VariableDef::new(VariableId::new(raw_id), name, unit));
            let _ = catalog.by_name.insert(def.name.clone(), Arc::clone(&def));
            catalog.by_id.push(def);
        }
        Ok(catalog)
    }

    /// Look up a variable by name.
    pub fn by_name(&self, name: &str) -> Option<&Arc<VariableDef>> {
        self.by_name.get(name)
    }

    /// Look up a variable by id.
    pub fn by_id(&self, id: VariableId) -> Option<&Arc<VariableDef>> {
        usize::try_from(id.get())
            .ok()
            .and_then(|idx| self.by_id.get(idx))
    }

    /// Number of variables.
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// All variables in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<VariableDef>> {
        self.by_id.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = "\
# name,unit
INDICATED ALTITUDE,feet

ATC HEAVY,Bool
ATC ID,String8
ATC AIRLINE,String64
GENERAL ENG THROTTLE LEVER POSITION:1, percent
";

    #[test]
    fn ids_follow_file_order() {
        let catalog = VariableCatalog::parse(SAMPLE).unwrap();
        assert_eq!(catalog.len(), 5);
        let alt = catalog.by_name("INDICATED ALTITUDE").unwrap();
        assert_eq!(alt.id, VariableId::new(0));
        assert_eq!(alt.unit, "feet");
        assert_eq!(alt.kind, ValueKind::Float64);
        let throttle = catalog
            .by_name("GENERAL ENG THROTTLE LEVER POSITION:1")
            .unwrap();
        assert_eq!(throttle.id, VariableId::new(4));
        assert_eq!(throttle.unit, "percent");
    }

    #[test]
    fn kinds_resolved_at_load() {
        let catalog = VariableCatalog::parse(SAMPLE).unwrap();
        assert_eq!(catalog.by_name("ATC HEAVY").unwrap().kind, ValueKind::Bool);
        assert_eq!(catalog.by_name("ATC ID").unwrap().kind, ValueKind::ShortString);
        assert_eq!(
            catalog.by_name("ATC AIRLINE").unwrap().kind,
            ValueKind::LongString
        );
    }

    #[test]
    fn lookup_by_id_matches_by_name() {
        let catalog = VariableCatalog::parse(SAMPLE).unwrap();
        for def in catalog.iter() {
            let same = catalog.by_id(def.id).unwrap();
            assert_eq!(catalog.by_name(&same.name).unwrap().id, def.id);
        }
        assert!(catalog.by_id(VariableId::new(99)).is_none());
        assert!(catalog.by_name("BOGUS").is_none());
    }

    #[test]
    fn line_without_comma_is_malformed() {
        let err = VariableCatalog::parse("INDICATED ALTITUDE,feet\nBROKEN LINE\n").unwrap_err();
        assert!(matches!(err, CatalogError::Malformed { line: 2, .. }));
    }

    #[test]
    fn empty_unit_is_malformed() {
        let err = VariableCatalog::parse("INDICATED ALTITUDE,  \n").unwrap_err();
        assert!(matches!(err, CatalogError::Malformed { line: 1, .. }));
    }

    #[test]
    fn empty_name_is_malformed() {
        let err = VariableCatalog::parse(",feet\n").unwrap_err();
        assert!(matches!(err, CatalogError::Malformed { line: 1, .. }));
    }

    #[test]
    fn duplicate_name_rejected() {
        let err = VariableCatalog::parse("A,feet\nB,knots\nA,meters\n").unwrap_err();
        match err {
            CatalogError::DuplicateName { name, line } => {
                assert_eq!(name, "A");
                assert_eq!(line, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = VariableCatalog::load(Path::new("/definitely/not/here.csv")).unwrap_err();
        assert!(matches!(err, CatalogError::Io { .. }));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let catalog = VariableCatalog::load(file.path()).unwrap();
        assert_eq!(catalog.len(), 5);
    }

    #[test]
    fn from_pairs_assigns_sequential_ids() {
        let catalog =
            VariableCatalog::from_pairs([("INDICATED ALTITUDE", "feet"), ("ATC ID", "String8")])
                .unwrap();
        assert_eq!(catalog.by_name("ATC ID").unwrap().id, VariableId::new(1));
    }

    #[test]
    fn registration_unit_blank_for_strings() {
        let catalog = VariableCatalog::parse(SAMPLE).unwrap();
        assert_eq!(catalog.by_name("ATC ID").unwrap().registration_unit(), "");
        assert_eq!(
            catalog.by_name("INDICATED ALTITUDE").unwrap().registration_unit(),
            "feet"
        );
    }
}
