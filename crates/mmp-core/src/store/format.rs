//! Layout of the persisted data set file.
//!
//! A file is plain text. A header block (`<mmpFileInfo>`) carries `<key="value">`
//! properties and a `<fields>` table; an optional `<uiConfiguration>` block is
//! stored verbatim; four data blocks follow with one tab-delimited row per line:
//!
//! | block                     | columns                                                  |
//! |---------------------------|----------------------------------------------------------|
//! | `molecules`               | index, coordinates, structure ID, name, field values...  |
//! | `mmpUniqueFragments`      | structure ID, heavy atoms, 5 fingerprint IDs             |
//! | `mmpFragments`            | key 1, key 2 (or empty), value, cut type, molecule       |
//! | `matchedMolecularPairs`   | value 1, size 1, value 2, size 2, cut type, count, examples |
//!
//! Examples are written as `m1,m2|m1,m2|...`. Row counts are announced in the header
//! and verified on load.

use crate::core::fields::{FieldInfo, FieldValue, sanitize};
use crate::core::models::ids::{FragmentIndex, MoleculeIndex};
use crate::engine::dictionary::Fingerprint;
use crate::engine::records::{FragmentationRecord, MmpKey};
use chrono::{DateTime, FixedOffset};

pub const FORMAT_VERSION: &str = "1.0";
/// Decimal places of numeric field values.
pub const VALUE_PRECISION: usize = 4;

pub const FILE_INFO_BLOCK: &str = "mmpFileInfo";
pub const FIELDS_BLOCK: &str = "fields";
pub const UI_CONFIGURATION_BLOCK: &str = "uiConfiguration";
pub const MOLECULES_BLOCK: &str = "molecules";
pub const UNIQUE_FRAGMENTS_BLOCK: &str = "mmpUniqueFragments";
pub const FRAGMENTS_BLOCK: &str = "mmpFragments";
pub const PAIRS_BLOCK: &str = "matchedMolecularPairs";

pub const KEY_VERSION: &str = "version";
pub const KEY_CREATED: &str = "created";
pub const KEY_DATASET_NAME: &str = "dataSetName";
pub const KEY_KEYS_MIN_ATOMS: &str = "keysMinAtoms";
pub const KEY_MOLECULE_COUNT: &str = "moleculeCount";
pub const KEY_UNIQUE_FRAGMENT_COUNT: &str = "uniqueFragmentCount";
pub const KEY_FRAGMENT_COUNT: &str = "fragmentCount";
pub const KEY_PAIR_COUNT: &str = "pairCount";

pub fn open_tag(block: &str) -> String {
    format!("<{}>", block)
}

pub fn close_tag(block: &str) -> String {
    format!("</{}>", block)
}

pub fn property_line(key: &str, value: &str) -> String {
    format!("<{}=\"{}\">", key, value)
}

/// Splits a `<key="value">` line.
pub fn parse_property_line(line: &str) -> Option<(&str, &str)> {
    let inner = line.trim().strip_prefix('<')?.strip_suffix('>')?;
    let (key, value) = inner.split_once('=')?;
    let value = value.strip_prefix('"')?.strip_suffix('"')?;
    Some((key, value))
}

/// Row counts of the four data blocks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowCounts {
    pub molecules: usize,
    pub unique_fragments: usize,
    pub fragments: usize,
    pub pairs: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileHeader {
    pub version: String,
    pub created: DateTime<FixedOffset>,
    pub dataset_name: String,
    pub keys_min_atoms: usize,
    pub counts: RowCounts,
    pub fields: Vec<FieldInfo>,
}

/// One input row of the molecule table.
///
/// Rows sharing a structure share the molecule index.
#[derive(Debug, Clone, PartialEq)]
pub struct MoleculeRow {
    pub index: MoleculeIndex,
    pub coordinates: Option<String>,
    pub id_code: String,
    pub name: String,
    pub values: Vec<FieldValue>,
}

/// A persisted matched pair; example key sets are not stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairRow {
    pub key: MmpKey,
    pub examples: Vec<(MoleculeIndex, MoleculeIndex)>,
}

pub fn format_molecule_row(row: &MoleculeRow) -> String {
    let mut columns = vec![
        row.index.to_string(),
        row.coordinates.as_deref().map(sanitize).unwrap_or_default(),
        row.id_code.clone(),
        sanitize(&row.name),
    ];
    columns.extend(row.values.iter().map(|v| v.format(VALUE_PRECISION)));
    columns.join("\t")
}

pub fn format_unique_fragment_row(id: &str, heavy_atoms: usize, fingerprint: &Fingerprint) -> String {
    let mut columns = vec![id.to_string(), heavy_atoms.to_string()];
    columns.extend(fingerprint.ids().iter().cloned());
    columns.join("\t")
}

pub fn format_fragment_row(record: &FragmentationRecord) -> String {
    format!(
        "{}\t{}\t{}\t{}\t{}",
        record.keys.first(),
        record.keys.second().map(|k| k.to_string()).unwrap_or_default(),
        record.value,
        record.cut_type().as_u8(),
        record.molecule
    )
}

pub fn format_pair_row<I>(key: &MmpKey, examples: I) -> String
where
    I: ExactSizeIterator<Item = (MoleculeIndex, MoleculeIndex)>,
{
    let count = examples.len();
    let examples: Vec<String> = examples.map(|(m1, m2)| format!("{},{}", m1, m2)).collect();
    format!(
        "{}\t{}\t{}\t{}\t{}\t{}\t{}",
        key.value1,
        key.value1_atoms,
        key.value2,
        key.value2_atoms,
        key.cut_type.as_u8(),
        count,
        examples.join("|")
    )
}

/// Parses a `m1,m2|m1,m2` example list.
pub fn parse_examples(field: &str) -> Option<Vec<(MoleculeIndex, MoleculeIndex)>> {
    if field.is_empty() {
        return Some(Vec::new());
    }
    field
        .split('|')
        .map(|pair| {
            let (m1, m2) = pair.split_once(',')?;
            Some((m1.parse().ok()?, m2.parse().ok()?))
        })
        .collect()
}

/// Parses an optional fragment index column.
pub fn parse_optional_index(field: &str) -> Option<Option<FragmentIndex>> {
    if field.is_empty() {
        Some(None)
    } else {
        field.parse().ok().map(Some)
    }
}
