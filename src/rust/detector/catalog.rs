use std::collections::BTreeMap;
use std::fmt;
use serde::de::{Deserializer, MapAccess, Visitor};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::CatalogError;

/// Name used when a class index has no catalog entry.
pub const UNKNOWN_DISEASE: &str = "Unknown";
/// Treatment used when a class index has no catalog entry.
pub const NO_TREATMENT: &str = "No treatment available";

/// Disease name and treatment advice for one class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiseaseInfo {
    pub name: String,
    pub treatment: String,
}

impl DiseaseInfo {
    pub fn new(name: impl Into<String>, treatment: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            treatment: treatment.into(),
        }
    }

    /// The entry substituted for class indices missing from the catalog.
    pub fn unknown() -> Self {
        Self::new(UNKNOWN_DISEASE, NO_TREATMENT)
    }
}

/// Immutable mapping from class index to disease name and treatment.
///
/// The catalog asset is a JSON object keyed by the decimal class index:
///
/// ```json
/// {
///   "0": { "name": "Apple scab", "treatment": "Remove fallen leaves..." },
///   "1": { "name": "Apple black rot", "treatment": "Prune cankers..." }
/// }
/// ```
///
/// Key order in the file does not matter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelCatalog {
    entries: BTreeMap<usize, DiseaseInfo>,
}

impl LabelCatalog {
    /// Builds a catalog from already-validated entries.
    pub fn from_entries(entries: impl IntoIterator<Item = (usize, DiseaseInfo)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    /// Parses the catalog asset. Any malformed entry rejects the whole catalog.
    pub fn from_json(text: &str) -> Result<Self, CatalogError> {
        let RawCatalog(members) = serde_json::from_str(text).map_err(|e| {
            if e.is_data() {
                CatalogError::Parse {
                    key: "<root>".to_string(),
                    reason: e.to_string(),
                }
            } else {
                CatalogError::Json(e)
            }
        })?;
        Self::from_members(members)
    }

    fn from_members(members: Vec<(String, Value)>) -> Result<Self, CatalogError> {
        let mut entries = BTreeMap::new();
        for (key, value) in members {
            let index = parse_index(&key)?;

            let info = DiseaseInfo::deserialize(&value).map_err(|e| CatalogError::Parse {
                key: key.clone(),
                reason: e.to_string(),
            })?;

            // Covers both a repeated key and "7" next to "07"
            if entries.insert(index, info).is_some() {
                return Err(CatalogError::Parse {
                    key,
                    reason: format!("class index {} appears more than once", index),
                });
            }
        }
        Ok(Self { entries })
    }

    pub fn get(&self, index: usize) -> Option<&DiseaseInfo> {
        self.entries.get(&index)
    }

    /// Returns the entry for `index`, or the "Unknown" sentinel on a miss.
    pub fn lookup(&self, index: usize) -> DiseaseInfo {
        self.get(index).cloned().unwrap_or_else(DiseaseInfo::unknown)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Catalog indices that fall outside a model's `0..num_classes` range.
    pub fn out_of_range(&self, num_classes: usize) -> Vec<usize> {
        self.entries.range(num_classes..).map(|(&i, _)| i).collect()
    }
}

fn parse_index(key: &str) -> Result<usize, CatalogError> {
    let invalid = |reason: &str| CatalogError::Parse {
        key: key.to_string(),
        reason: reason.to_string(),
    };
    // usize::from_str alone would also take "+7"
    if key.is_empty() || !key.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid("class index must be a non-negative decimal integer"));
    }
    key.parse().map_err(|_| invalid("class index is too large"))
}

/// Top-level members of the catalog object in file order, repeats included.
///
/// Going through `serde_json::Value` would keep only the last of two equal keys.
struct RawCatalog(Vec<(String, Value)>);

impl<'de> Deserialize<'de> for RawCatalog {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MembersVisitor;

        impl<'de> Visitor<'de> for MembersVisitor {
            type Value = RawCatalog;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a JSON object keyed by class index")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<RawCatalog, A::Error> {
                let mut members = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((key, value)) = map.next_entry::<String, serde_json::Value>()? {
                    members.push((key, value));
                }
                Ok(RawCatalog(members))
            }
        }

        deserializer.deserialize_map(MembersVisitor)
    }
}
