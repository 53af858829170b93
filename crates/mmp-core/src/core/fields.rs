//! Per-field value parsing, collection-wide field classification and the
//! concentration-to-potency conversion applied when data sets are written.

use chrono::NaiveDate;
use phf::phf_map;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Molar factors of the recognized concentration units.
static CONCENTRATION_UNITS: phf::Map<&'static str, f64> = phf_map! {
    "mM" => 1e-3,
    "uM" => 1e-6,
    "µM" => 1e-6,
    "μM" => 1e-6,
    "nM" => 1e-9,
    "pM" => 1e-12,
};

const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%d.%m.%Y", "%m/%d/%Y", "%Y/%m/%d"];

/// Prefix given to fields converted to a potency scale.
pub const POTENCY_PREFIX: &str = "p";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Comparator {
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
}

impl Comparator {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Less => "<",
            Self::Greater => ">",
            Self::LessEqual => "<=",
            Self::GreaterEqual => ">=",
        }
    }

    /// Splits a leading comparator off `s`, longest operator first.
    fn split(s: &str) -> Option<(Self, &str)> {
        [Self::LessEqual, Self::GreaterEqual, Self::Less, Self::Greater]
            .into_iter()
            .find_map(|c| s.strip_prefix(c.as_str()).map(|rest| (c, rest)))
    }
}

/// Classification of a field across the whole molecule collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldCategory {
    Numeric,
    Date,
    Text,
}

impl FieldCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Numeric => "numeric",
            Self::Date => "date",
            Self::Text => "text",
        }
    }
}

impl fmt::Display for FieldCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldCategory {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "numeric" => Ok(Self::Numeric),
            "date" => Ok(Self::Date),
            "text" => Ok(Self::Text),
            _ => Err(()),
        }
    }
}

/// A single raw field value, interpreted once.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum FieldValue {
    Empty,
    Number(f64),
    Qualified(Comparator, f64),
    Date(NaiveDate),
    Text(String),
}

impl FieldValue {
    /// Interprets a raw cell without any knowledge of the field's category.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Self::Empty;
        }
        if let Ok(v) = trimmed.parse::<f64>() {
            if v.is_finite() {
                return Self::Number(v);
            }
        }
        if let Some((comparator, rest)) = Comparator::split(trimmed) {
            if let Ok(v) = rest.trim().parse::<f64>() {
                if v.is_finite() {
                    return Self::Qualified(comparator, v);
                }
            }
        }
        if let Some(date) = DATE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
        {
            return Self::Date(date);
        }
        Self::Text(trimmed.to_string())
    }

    /// Interprets a raw cell of a field whose category is already known.
    ///
    /// Text fields keep their raw content verbatim.
    pub fn parse_as(raw: &str, category: FieldCategory) -> Self {
        match category {
            FieldCategory::Text if !raw.trim().is_empty() => Self::Text(raw.trim().to_string()),
            _ => Self::parse(raw),
        }
    }

    /// The exact numeric value; qualified values are not exact and return `None`.
    pub fn exact(&self) -> Option<f64> {
        match self {
            Self::Number(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric magnitude including qualified values.
    pub fn magnitude(&self) -> Option<f64> {
        match self {
            Self::Number(v) | Self::Qualified(_, v) => Some(*v),
            _ => None,
        }
    }

    /// Formats the value for the persisted molecule table.
    pub fn format(&self, precision: usize) -> String {
        match self {
            Self::Empty => String::new(),
            Self::Number(v) => format!("{:.*}", precision, v),
            Self::Qualified(c, v) => format!("{}{:.*}", c.as_str(), precision, v),
            Self::Date(d) => d.format("%Y-%m-%d").to_string(),
            Self::Text(t) => sanitize(t),
        }
    }
}

/// Replaces characters that would break a tab-delimited row.
pub fn sanitize(text: &str) -> String {
    text.chars()
        .map(|c| if matches!(c, '\t' | '\n' | '\r') { ' ' } else { c })
        .collect()
}

/// Tracks the category of every field while values stream in.
///
/// Classification is monotonic: an undecided field becomes numeric or date on its
/// first informative value, and any contradicting value permanently downgrades it
/// to text.
#[derive(Debug, Clone, Default)]
pub struct FieldClassifier {
    categories: Vec<Option<FieldCategory>>,
}

impl FieldClassifier {
    pub fn new(field_count: usize) -> Self {
        Self {
            categories: vec![None; field_count],
        }
    }

    pub fn observe(&mut self, field: usize, value: &FieldValue) {
        if field >= self.categories.len() {
            self.categories.resize(field + 1, None);
        }
        let observed = match value {
            FieldValue::Empty => return,
            FieldValue::Number(_) | FieldValue::Qualified(..) => FieldCategory::Numeric,
            FieldValue::Date(_) => FieldCategory::Date,
            FieldValue::Text(_) => FieldCategory::Text,
        };
        let slot = &mut self.categories[field];
        *slot = match *slot {
            None => Some(observed),
            Some(FieldCategory::Text) => Some(FieldCategory::Text),
            Some(current) if current == observed => Some(current),
            Some(_) => Some(FieldCategory::Text),
        };
    }

    /// The final category of a field; fields without any value are text.
    pub fn category(&self, field: usize) -> FieldCategory {
        self.categories
            .get(field)
            .copied()
            .flatten()
            .unwrap_or(FieldCategory::Text)
    }

    pub fn categories(&self) -> Vec<FieldCategory> {
        (0..self.categories.len()).map(|i| self.category(i)).collect()
    }
}

/// Describes a field of the persisted data set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldInfo {
    /// The (possibly rewritten) field name.
    pub name: String,
    /// The original field name as found in the input.
    pub long_name: String,
    pub category: FieldCategory,
}

/// A potency conversion derived from a field name with a concentration suffix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PotencyConversion {
    pub molar_factor: f64,
}

impl PotencyConversion {
    /// Converts a concentration into `-log10(value * factor)`, keeping any comparator.
    ///
    /// Non-positive concentrations have no potency and become empty.
    pub fn apply(&self, value: &FieldValue) -> FieldValue {
        let convert = |v: f64| -> Option<f64> {
            (v > 0.0).then(|| -(v * self.molar_factor).log10())
        };
        match value {
            FieldValue::Number(v) => convert(*v).map_or(FieldValue::Empty, FieldValue::Number),
            FieldValue::Qualified(c, v) => convert(*v)
                .map_or(FieldValue::Empty, |p| FieldValue::Qualified(*c, p)),
            other => other.clone(),
        }
    }
}

/// Recognizes a concentration unit suffix on a field name.
///
/// Supported decorations are `name_uM`, `name uM`, `name (uM)` and `name [uM]`.
///
/// # Return
///
/// The rewritten potency field name (`p` + stem) and the conversion to apply.
pub fn potency_field(name: &str) -> Option<(String, PotencyConversion)> {
    let trimmed = name.trim();
    for (unit, &factor) in CONCENTRATION_UNITS.entries() {
        let stem = [
            format!("({})", unit),
            format!("[{}]", unit),
            format!("_{}", unit),
            format!(" {}", unit),
        ]
        .iter()
        .find_map(|suffix| trimmed.strip_suffix(suffix.as_str()))
        .map(|stem| stem.trim_end_matches([' ', '_']));

        if let Some(stem) = stem.filter(|s| !s.is_empty()) {
            return Some((
                format!("{}{}", POTENCY_PREFIX, stem),
                PotencyConversion {
                    molar_factor: factor,
                },
            ));
        }
    }
    None
}

/// Nearest-rank percentile of an ascending sorted slice.
pub fn percentile(sorted: &[f64], fraction: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let rank = (fraction.clamp(0.0, 1.0) * (sorted.len() - 1) as f64).round() as usize;
    sorted.get(rank).copied()
}
