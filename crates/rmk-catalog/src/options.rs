//! Option attributes and option definitions.
//!
//! A variant is identified inside its product by its option attributes
//! (e.g. `{Color: Red, Size: M}`). Two attribute maps describe the same
//! variant iff their canonical keys are equal; see [`canonical_key`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Attribute key that never participates in variant identity.
pub const RESERVED_SKU_KEY: &str = "SKU";

/// Separator between `key=value` pairs in a canonical key.
pub const KEY_DELIMITER: char = '|';

// ---------------------------------------------------------------------------
// OptionAttributes
// ---------------------------------------------------------------------------

/// Option name → value map of a single variant.
///
/// Keys are stored as given. Comparison between variants must go through
/// [`OptionAttributes::canonical_key`], never through `==` on the map.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OptionAttributes(BTreeMap<String, String>);

impl OptionAttributes {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    /// Case- and whitespace-insensitive lookup by option name.
    pub fn get(&self, name: &str) -> Option<&str> {
        let wanted = normalize(name);
        self.0
            .iter()
            .find(|(k, _)| normalize(k) == wanted)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &BTreeMap<String, String> {
        &self.0
    }

    pub fn into_map(self) -> BTreeMap<String, String> {
        self.0
    }

    pub fn canonical_key(&self) -> String {
        canonical_key(self)
    }
}

impl From<BTreeMap<String, String>> for OptionAttributes {
    fn from(m: BTreeMap<String, String>) -> Self {
        Self(m)
    }
}

impl<K, V> FromIterator<(K, V)> for OptionAttributes
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut a = OptionAttributes::new();
        for (k, v) in iter {
            a.insert(k, v);
        }
        a
    }
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

/// Canonical identity string of an attribute map.
///
/// - drops the reserved `SKU` key and blank keys
/// - trims and lower-cases keys and values
/// - sorts by key and joins `key=value` pairs with [`KEY_DELIMITER`]
///
/// An empty map yields `""` ("no distinguishing options").
pub fn canonical_key(attrs: &OptionAttributes) -> String {
    let reserved = normalize(RESERVED_SKU_KEY);
    let mut pairs: Vec<(String, String)> = attrs
        .iter()
        .filter_map(|(k, v)| {
            let k = normalize(k);
            if k.is_empty() || k == reserved {
                None
            } else {
                Some((k, normalize(v)))
            }
        })
        .collect();

    // Keys that differ only in case collapse; keep the smallest value so the
    // result does not depend on map ordering.
    pairs.sort();
    pairs.dedup_by(|later, earlier| later.0 == earlier.0);

    let mut out = String::new();
    for (i, (k, v)) in pairs.iter().enumerate() {
        if i > 0 {
            out.push(KEY_DELIMITER);
        }
        out.push_str(k);
        out.push('=');
        out.push_str(v);
    }
    out
}

// ---------------------------------------------------------------------------
// OptionDefinition
// ---------------------------------------------------------------------------

/// One named option dimension and its candidate values.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionDimension {
    pub name: String,
    #[serde(default)]
    pub values: Vec<String>,
}

impl OptionDimension {
    pub fn new<S: Into<String>>(
        name: impl Into<String>,
        values: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }
}

/// Ordered option space of a product. Derived from variant attributes and
/// optionally edited by an admin; never persisted on its own.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OptionDefinition {
    pub options: Vec<OptionDimension>,
}

impl OptionDefinition {
    pub fn new(options: Vec<OptionDimension>) -> Self {
        Self { options }
    }

    /// Builder-style helper used by callers and tests.
    pub fn with_option<S: Into<String>>(
        mut self,
        name: impl Into<String>,
        values: impl IntoIterator<Item = S>,
    ) -> Self {
        self.options.push(OptionDimension::new(name, values));
        self
    }

    /// Derive the option space covered by a set of attribute maps, in
    /// first-seen order. The reserved `SKU` key is ignored.
    pub fn from_attributes<'a, I>(attrs: I) -> Self
    where
        I: IntoIterator<Item = &'a OptionAttributes>,
    {
        let mut def = OptionDefinition::default();
        for a in attrs {
            for (k, v) in a.iter() {
                if normalize(k) == normalize(RESERVED_SKU_KEY) {
                    continue;
                }
                def.add_value(k, v);
            }
        }
        def
    }

    /// Union of `self` (kept first) and `other`. Names and values are matched
    /// case-insensitively; the first spelling seen wins.
    pub fn merge(&self, other: &OptionDefinition) -> OptionDefinition {
        let mut out = self.clone();
        for dim in &other.options {
            if dim.values.is_empty() {
                out.ensure_dimension(&dim.name);
            }
            for v in &dim.values {
                out.add_value(&dim.name, v);
            }
        }
        out
    }

    /// Add `value` under option `name`, creating the option if needed.
    /// Blank names or values and case-insensitive duplicates are ignored.
    pub fn add_value(&mut self, name: &str, value: &str) {
        if value.trim().is_empty() {
            return;
        }
        let Some(idx) = self.ensure_dimension(name) else {
            return;
        };
        let dim = &mut self.options[idx];
        let wanted = normalize(value);
        if !dim.values.iter().any(|v| normalize(v) == wanted) {
            dim.values.push(value.trim().to_string());
        }
    }

    /// Remove `value` from option `name` (case-insensitive). Returns whether
    /// anything was removed.
    pub fn remove_value(&mut self, name: &str, value: &str) -> bool {
        let wanted_name = normalize(name);
        let wanted_value = normalize(value);
        let mut removed = false;
        for dim in self
            .options
            .iter_mut()
            .filter(|d| normalize(&d.name) == wanted_name)
        {
            let before = dim.values.len();
            dim.values.retain(|v| normalize(v) != wanted_value);
            removed |= dim.values.len() != before;
        }
        removed
    }

    fn ensure_dimension(&mut self, name: &str) -> Option<usize> {
        let wanted = normalize(name);
        if wanted.is_empty() {
            return None;
        }
        if let Some(i) = self.options.iter().position(|d| normalize(&d.name) == wanted) {
            return Some(i);
        }
        self.options.push(OptionDimension {
            name: name.trim().to_string(),
            values: Vec::new(),
        });
        Some(self.options.len() - 1)
    }

    /// Dimensions that take part in the cross product: non-blank name, at
    /// least one non-blank value.
    ///
    /// Names and values are folded after trimming and lower-casing. A
    /// repeated option name merges its values into the first occurrence
    /// (keeping that spelling and position), and a repeated value within an
    /// option is kept once, first spelling wins. Folded entries never
    /// multiply the cross product.
    fn effective_dimensions(&self) -> Vec<(String, Vec<String>)> {
        let mut out: Vec<(String, Vec<String>)> = Vec::new();
        for dim in &self.options {
            let name = dim.name.trim();
            if name.is_empty() {
                continue;
            }
            let idx = match out
                .iter()
                .position(|(n, _)| normalize(n) == normalize(name))
            {
                Some(i) => i,
                None => {
                    out.push((name.to_string(), Vec::new()));
                    out.len() - 1
                }
            };
            for v in &dim.values {
                let v = v.trim();
                if v.is_empty() {
                    continue;
                }
                let values = &mut out[idx].1;
                if !values.iter().any(|x| normalize(x) == normalize(v)) {
                    values.push(v.to_string());
                }
            }
        }
        out.retain(|(_, values)| !values.is_empty());
        out
    }

    /// True number of combinations `cross_product` would produce.
    /// Saturates at `u64::MAX` instead of overflowing.
    pub fn combination_count(&self) -> u64 {
        let dims = self.effective_dimensions();
        if dims.is_empty() {
            return 0;
        }
        dims.iter()
            .fold(1u64, |acc, (_, values)| acc.saturating_mul(values.len() as u64))
    }

    pub fn is_empty(&self) -> bool {
        self.combination_count() == 0
    }
}

/// Full Cartesian product of an option definition.
///
/// Options with a blank name or no values are excluded; if every option is
/// excluded the result is empty. Duplicate option names and values that only
/// differ in case or surrounding whitespace are folded first, so the size is
/// [`OptionDefinition::combination_count`], not the product of the raw
/// value counts. Output order is deterministic: odometer order over the
/// declaration order of options and values.
pub fn cross_product(def: &OptionDefinition) -> Vec<OptionAttributes> {
    let dims = def.effective_dimensions();
    if dims.is_empty() {
        return Vec::new();
    }

    let mut out = vec![OptionAttributes::new()];
    for (name, values) in dims {
        let mut next = Vec::with_capacity(out.len().saturating_mul(values.len()));
        for base in &out {
            for v in &values {
                let mut combo = base.clone();
                combo.insert(name.clone(), v.clone());
                next.push(combo);
            }
        }
        out = next;
    }
    out
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(pairs: &[(&str, &str)]) -> OptionAttributes {
        pairs.iter().map(|(k, v)| (*k, *v)).collect()
    }

    #[test]
    fn canonical_key_ignores_case_whitespace_and_order() {
        let a = attrs(&[("Color", "Red"), ("Size", "M")]);
        let b = attrs(&[(" size ", "m "), ("COLOR", " red")]);
        assert_eq!(a.canonical_key(), b.canonical_key());
        assert_eq!(a.canonical_key(), "color=red|size=m");
    }

    #[test]
    fn canonical_key_drops_reserved_sku() {
        let a = attrs(&[("Color", "Red"), ("sku", "ABC-1")]);
        assert_eq!(a.canonical_key(), "color=red");
    }

    #[test]
    fn empty_attributes_give_empty_key() {
        assert_eq!(OptionAttributes::new().canonical_key(), "");
        assert_eq!(attrs(&[("SKU", "X")]).canonical_key(), "");
    }

    #[test]
    fn get_is_case_insensitive() {
        let a = attrs(&[("Color", "Red")]);
        assert_eq!(a.get(" color"), Some("Red"));
        assert_eq!(a.get("size"), None);
    }

    #[test]
    fn cross_product_size_is_product_of_value_counts() {
        let def = OptionDefinition::default()
            .with_option("Color", ["Red", "Blue", "Green"])
            .with_option("Size", ["S", "M"]);
        let combos = cross_product(&def);
        assert_eq!(combos.len(), 6);
        assert_eq!(def.combination_count(), 6);
    }

    #[test]
    fn cross_product_excludes_blank_and_empty_options() {
        let def = OptionDefinition::default()
            .with_option("Color", ["Red", "Blue"])
            .with_option("  ", ["X"])
            .with_option("Material", Vec::<String>::new());
        let combos = cross_product(&def);
        assert_eq!(combos.len(), 2);
        assert!(combos.iter().all(|c| c.len() == 1));
    }

    #[test]
    fn duplicate_names_and_values_fold_before_the_cross_product() {
        // Raw counts: 3 × 2 × 2 = 12. Folded: Color {Red, Blue, Green} × Size {M}.
        let def = OptionDefinition::default()
            .with_option("Color", ["Red", " red ", "Blue"])
            .with_option("Size", ["M", "m"])
            .with_option("COLOR", ["Green", "BLUE"]);
        let combos = cross_product(&def);
        assert_eq!(combos.len(), 3);
        assert_eq!(def.combination_count(), 3);

        let keys: Vec<String> = combos.iter().map(canonical_key).collect();
        assert_eq!(
            keys,
            vec!["color=red|size=m", "color=blue|size=m", "color=green|size=m"]
        );
        // First spelling of the name and the value is kept.
        assert!(combos.iter().all(|c| c.as_map().contains_key("Color")));
        assert_eq!(combos[0].as_map().get("Color").map(String::as_str), Some("Red"));
    }

    #[test]
    fn cross_product_of_nothing_is_empty() {
        let def = OptionDefinition::default().with_option("Size", Vec::<String>::new());
        assert!(cross_product(&def).is_empty());
        assert_eq!(def.combination_count(), 0);
    }

    #[test]
    fn cross_product_is_deterministic_odometer_order() {
        let def = OptionDefinition::default()
            .with_option("Color", ["Red", "Blue"])
            .with_option("Size", ["S", "M"]);
        let keys: Vec<String> = cross_product(&def).iter().map(canonical_key).collect();
        assert_eq!(
            keys,
            vec![
                "color=red|size=s",
                "color=red|size=m",
                "color=blue|size=s",
                "color=blue|size=m",
            ]
        );
        let again: Vec<String> = cross_product(&def).iter().map(canonical_key).collect();
        assert_eq!(keys, again);
    }

    #[test]
    fn duplicate_values_collapse() {
        let def = OptionDefinition::default().with_option("Color", ["Red", "red ", "Blue"]);
        assert_eq!(cross_product(&def).len(), 2);
    }

    #[test]
    fn merge_unions_case_insensitively_keeping_first_spelling() {
        let existing = OptionDefinition::default().with_option("Color", ["Red"]);
        let incoming = OptionDefinition::default()
            .with_option("color", ["RED", "Blue"])
            .with_option("Size", ["L"]);
        let merged = existing.merge(&incoming);
        assert_eq!(merged.options.len(), 2);
        assert_eq!(merged.options[0].name, "Color");
        assert_eq!(merged.options[0].values, vec!["Red", "Blue"]);
        assert_eq!(merged.options[1].values, vec!["L"]);
    }

    #[test]
    fn from_attributes_skips_sku() {
        let a = attrs(&[("Color", "Red"), ("SKU", "A1")]);
        let b = attrs(&[("Color", "Blue")]);
        let def = OptionDefinition::from_attributes([&a, &b]);
        assert_eq!(def.options.len(), 1);
        assert_eq!(def.options[0].values, vec!["Red", "Blue"]);
    }

    #[test]
    fn remove_value_edits_definition() {
        let mut def = OptionDefinition::default().with_option("Size", ["S", "M", "L"]);
        assert!(def.remove_value("size", "m"));
        assert!(!def.remove_value("size", "xl"));
        assert_eq!(def.combination_count(), 2);
    }
}
