//! Geographic hierarchy definitions
//!
//! A hierarchy is a fixed four-level tree. Each level names its table, its
//! ID and display-name columns, the column pointing at its parent level and
//! the query-string parameter that carries its ID. KPI tables reuse the
//! level ID column names as their foreign keys.

use std::fmt;
use std::str::FromStr;

use crate::database::Ident;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Level {
    /// Path segment under `/api/filters/`, e.g. `divisions`.
    pub slug: &'static str,
    /// Query-string parameter, e.g. `divisionId`.
    pub param: &'static str,
    pub table: Ident,
    pub id_column: Ident,
    pub name_column: Ident,
    /// `None` only at the root.
    pub parent_column: Option<Ident>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HierarchyKind {
    Circle,
    District,
}

impl FromStr for HierarchyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "circle" => Ok(Self::Circle),
            "district" => Ok(Self::District),
            other => Err(format!(
                "unknown hierarchy '{}', expected 'circle' or 'district'",
                other
            )),
        }
    }
}

impl fmt::Display for HierarchyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Circle => f.write_str("circle"),
            Self::District => f.write_str("district"),
        }
    }
}

/// Ordered levels, root first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hierarchy {
    kind: HierarchyKind,
    levels: [Level; 4],
}

const fn level(
    slug: &'static str,
    param: &'static str,
    table: &'static str,
    id_column: &'static str,
    name_column: &'static str,
    parent_column: Option<&'static str>,
) -> Level {
    Level {
        slug,
        param,
        table: Ident::new(table),
        id_column: Ident::new(id_column),
        name_column: Ident::new(name_column),
        parent_column: match parent_column {
            Some(c) => Some(Ident::new(c)),
            None => None,
        },
    }
}

impl Hierarchy {
    /// Circle → Division → Subdivision → Section.
    pub fn circle() -> Self {
        Self {
            kind: HierarchyKind::Circle,
            levels: [
                level("circles", "circleId", "Circle", "CircleID", "CircleName", None),
                level(
                    "divisions",
                    "divisionId",
                    "Division",
                    "DivisionID",
                    "DivisionName",
                    Some("CircleID"),
                ),
                level(
                    "subdivisions",
                    "subdivisionId",
                    "Subdivision",
                    "SubdivisionID",
                    "SubdivisionName",
                    Some("DivisionID"),
                ),
                level(
                    "sections",
                    "sectionId",
                    "Section",
                    "SectionID",
                    "SectionName",
                    Some("SubdivisionID"),
                ),
            ],
        }
    }

    /// District → Substation → Feeder → DTR.
    pub fn district() -> Self {
        Self {
            kind: HierarchyKind::District,
            levels: [
                level("districts", "districtId", "District", "DistrictID", "DistrictName", None),
                level(
                    "substations",
                    "substationId",
                    "Substation",
                    "SubstationID",
                    "SubstationName",
                    Some("DistrictID"),
                ),
                level(
                    "feeders",
                    "feederId",
                    "Feeder",
                    "FeederID",
                    "FeederName",
                    Some("SubstationID"),
                ),
                level("dtrs", "dtrId", "DTR", "DTRID", "DTRName", Some("FeederID")),
            ],
        }
    }

    pub fn of_kind(kind: HierarchyKind) -> Self {
        match kind {
            HierarchyKind::Circle => Self::circle(),
            HierarchyKind::District => Self::district(),
        }
    }

    pub fn kind(&self) -> HierarchyKind {
        self.kind
    }

    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    pub fn root(&self) -> &Level {
        &self.levels[0]
    }

    pub fn leaf(&self) -> &Level {
        &self.levels[self.levels.len() - 1]
    }

    pub fn by_slug(&self, slug: &str) -> Option<(usize, &Level)> {
        self.levels.iter().enumerate().find(|(_, l)| l.slug == slug)
    }

    /// The level directly above `depth`, if any.
    pub fn parent_of(&self, depth: usize) -> Option<&Level> {
        depth.checked_sub(1).and_then(|d| self.levels.get(d))
    }
}

/// Parse an integer-valued identifier.
///
/// Accepts an optional leading `-` followed by ASCII digits and nothing
/// else; whitespace, signs like `+`, fractions and exponents are rejected.
/// Returns `None` for malformed or out-of-range input.
pub fn parse_integer(raw: &str) -> Option<i64> {
    let digits = raw.strip_prefix('-').unwrap_or(raw);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn circle_levels_chain_parent_columns() {
        let h = Hierarchy::circle();
        assert_eq!(h.root().parent_column, None);
        for pair in h.levels().windows(2) {
            assert_eq!(pair[1].parent_column, Some(pair[0].id_column));
        }
        assert_eq!(h.leaf().param, "sectionId");
    }

    #[test]
    fn district_levels_chain_parent_columns() {
        let h = Hierarchy::district();
        for pair in h.levels().windows(2) {
            assert_eq!(pair[1].parent_column, Some(pair[0].id_column));
        }
        assert_eq!(h.leaf().slug, "dtrs");
    }

    #[test]
    fn slug_lookup_and_parent() {
        let h = Hierarchy::circle();
        let (depth, level) = h.by_slug("subdivisions").unwrap();
        assert_eq!(depth, 2);
        assert_eq!(level.param, "subdivisionId");
        assert_eq!(h.parent_of(depth).unwrap().param, "divisionId");
        assert!(h.parent_of(0).is_none());
        assert!(h.by_slug("years").is_none());
    }

    #[test]
    fn hierarchy_kind_from_str() {
        assert_eq!("Circle".parse::<HierarchyKind>(), Ok(HierarchyKind::Circle));
        assert_eq!(" district ".parse::<HierarchyKind>(), Ok(HierarchyKind::District));
        assert!("zone".parse::<HierarchyKind>().is_err());
    }

    #[test]
    fn parse_integer_examples() {
        assert_eq!(parse_integer("42"), Some(42));
        assert_eq!(parse_integer("-3"), Some(-3));
        assert_eq!(parse_integer("007"), Some(7));
        for bad in ["", "-", "12a", "3.5", " 4", "4 ", "+4", "1e3", "0x10", "99999999999999999999"] {
            assert_eq!(parse_integer(bad), None, "accepted {:?}", bad);
        }
    }

    proptest! {
        #[test]
        fn any_i64_round_trips(n in any::<i64>()) {
            prop_assert_eq!(parse_integer(&n.to_string()), Some(n));
        }

        #[test]
        fn trailing_garbage_is_rejected(n in any::<u32>(), suffix in "[a-zA-Z. ]{1,4}") {
            let raw = format!("{}{}", n, suffix);
            prop_assert_eq!(parse_integer(&raw), None);
        }

        #[test]
        fn fractions_are_rejected(whole in any::<u16>(), frac in 0u16..1000) {
            let raw = format!("{}.{}", whole, frac);
            prop_assert_eq!(parse_integer(&raw), None);
        }
    }
}
