use super::error::StoreError;
use super::format::*;
use crate::core::fields::{FieldCategory, FieldInfo, FieldValue};
use crate::core::models::ids::FragmentIndex;
use crate::engine::dictionary::{FINGERPRINT_RADII, Fingerprint, FragmentDictionary};
use crate::engine::records::{CutType, FragmentationRecord, KeySet, MmpKey};
use chrono::DateTime;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{info, instrument};

/// The raw content of a persisted data set.
#[derive(Debug)]
pub struct LoadedTables {
    pub header: FileHeader,
    pub ui_configuration: Vec<String>,
    pub molecules: Vec<MoleculeRow>,
    pub dictionary: FragmentDictionary,
    pub fragments: Vec<FragmentationRecord>,
    pub pairs: Vec<PairRow>,
}

impl LoadedTables {
    /// Number of distinct molecule indices.
    pub fn molecule_count(&self) -> usize {
        self.molecules.iter().map(|m| m.index + 1).max().unwrap_or(0)
    }
}

struct LineReader<R: BufRead> {
    inner: R,
    line: usize,
    buffer: String,
}

impl<R: BufRead> LineReader<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            line: 0,
            buffer: String::new(),
        }
    }

    /// Returns the next line without its terminator, or `None` at end of input.
    fn next_line(&mut self) -> Result<Option<&str>, StoreError> {
        self.buffer.clear();
        if self.inner.read_line(&mut self.buffer)? == 0 {
            return Ok(None);
        }
        self.line += 1;
        Ok(Some(self.buffer.trim_end_matches(['\n', '\r'])))
    }

    /// Skips blank lines and returns the next one.
    fn next_content_line(&mut self) -> Result<Option<String>, StoreError> {
        loop {
            match self.next_line()? {
                None => return Ok(None),
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => return Ok(Some(line.to_string())),
            }
        }
    }

    fn expect_open(&mut self, block: &'static str) -> Result<(), StoreError> {
        match self.next_content_line()? {
            Some(line) if line.trim() == open_tag(block) => Ok(()),
            _ => Err(StoreError::MissingBlock(block)),
        }
    }

    fn malformed(&self, reason: impl Into<String>) -> StoreError {
        StoreError::MalformedRow {
            line: self.line,
            reason: reason.into(),
        }
    }

    fn out_of_range(&self, kind: &'static str, index: usize, available: usize) -> StoreError {
        StoreError::IndexOutOfRange {
            line: self.line,
            kind,
            index,
            available,
        }
    }

    /// Reads exactly `expected` rows of `block` followed by its closing tag.
    fn read_block<T>(
        &mut self,
        block: &'static str,
        expected: usize,
        parse: impl FnMut(&Self, &[&str]) -> Result<T, StoreError>,
    ) -> Result<Vec<T>, StoreError> {
        self.expect_open(block)?;
        self.read_rows(block, expected, parse)
    }

    /// Reads the rows of a block whose opening tag has been consumed.
    fn read_rows<T>(
        &mut self,
        block: &'static str,
        expected: usize,
        mut parse: impl FnMut(&Self, &[&str]) -> Result<T, StoreError>,
    ) -> Result<Vec<T>, StoreError> {
        let close = close_tag(block);
        let mut rows = Vec::with_capacity(expected);
        loop {
            let Some(line) = self.next_line()?.map(str::to_string) else {
                return Err(StoreError::RowCount {
                    block,
                    expected,
                    found: rows.len(),
                });
            };
            if line.trim() == close {
                break;
            }
            if rows.len() == expected {
                return Err(StoreError::RowCount {
                    block,
                    expected,
                    found: rows.len() + 1,
                });
            }
            let columns: Vec<&str> = line.split('\t').collect();
            rows.push(parse(self, &columns)?);
        }
        if rows.len() != expected {
            return Err(StoreError::RowCount {
                block,
                expected,
                found: rows.len(),
            });
        }
        Ok(rows)
    }
}

fn header_value<'a>(
    properties: &'a HashMap<String, String>,
    name: &'static str,
) -> Result<&'a str, StoreError> {
    properties
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| StoreError::HeaderField {
            name,
            reason: "missing".to_string(),
        })
}

fn header_count(properties: &HashMap<String, String>, name: &'static str) -> Result<usize, StoreError> {
    let raw = header_value(properties, name)?;
    raw.parse().map_err(|_| StoreError::HeaderField {
        name,
        reason: format!("'{}' is not a non-negative integer", raw),
    })
}

fn read_header<R: BufRead>(reader: &mut LineReader<R>) -> Result<FileHeader, StoreError> {
    reader.expect_open(FILE_INFO_BLOCK)?;
    let mut properties = HashMap::new();
    let mut fields = Vec::new();
    let close = close_tag(FILE_INFO_BLOCK);
    let fields_open = open_tag(FIELDS_BLOCK);
    let fields_close = close_tag(FIELDS_BLOCK);

    loop {
        let Some(line) = reader.next_content_line()? else {
            return Err(StoreError::MissingBlock(FILE_INFO_BLOCK));
        };
        let line = line.trim();
        if line == close {
            break;
        }
        if line == fields_open {
            loop {
                let Some(row) = reader.next_line()?.map(str::to_string) else {
                    return Err(StoreError::MissingBlock(FIELDS_BLOCK));
                };
                if row.trim() == fields_close {
                    break;
                }
                let columns: Vec<&str> = row.split('\t').collect();
                let [name, long_name, category] = columns.as_slice() else {
                    return Err(reader.malformed("field rows need name, long name and category"));
                };
                let category: FieldCategory = category
                    .parse()
                    .map_err(|_| reader.malformed(format!("unknown field category '{}'", category)))?;
                fields.push(FieldInfo {
                    name: name.to_string(),
                    long_name: long_name.to_string(),
                    category,
                });
            }
            continue;
        }
        let (key, value) =
            parse_property_line(line).ok_or_else(|| reader.malformed("expected a <key=\"value\"> line"))?;
        properties.insert(key.to_string(), value.to_string());
    }

    let version = header_value(&properties, KEY_VERSION)?.to_string();
    if version != FORMAT_VERSION {
        return Err(StoreError::UnsupportedVersion(version));
    }
    let created_raw = header_value(&properties, KEY_CREATED)?;
    let created = DateTime::parse_from_rfc3339(created_raw).map_err(|e| StoreError::HeaderField {
        name: KEY_CREATED,
        reason: e.to_string(),
    })?;

    Ok(FileHeader {
        version,
        created,
        dataset_name: header_value(&properties, KEY_DATASET_NAME)?.to_string(),
        keys_min_atoms: header_count(&properties, KEY_KEYS_MIN_ATOMS)?,
        counts: RowCounts {
            molecules: header_count(&properties, KEY_MOLECULE_COUNT)?,
            unique_fragments: header_count(&properties, KEY_UNIQUE_FRAGMENT_COUNT)?,
            fragments: header_count(&properties, KEY_FRAGMENT_COUNT)?,
            pairs: header_count(&properties, KEY_PAIR_COUNT)?,
        },
        fields,
    })
}

fn parse_index<R: BufRead>(
    reader: &LineReader<R>,
    raw: &str,
    what: &str,
) -> Result<usize, StoreError> {
    raw.parse()
        .map_err(|_| reader.malformed(format!("{} '{}' is not an index", what, raw)))
}

/// Reads a persisted data set, validating block structure, row counts and index
/// references.
#[instrument(skip_all, name = "data_set_read")]
pub fn read_tables<R: BufRead>(input: R) -> Result<LoadedTables, StoreError> {
    let mut reader = LineReader::new(input);
    let header = read_header(&mut reader)?;
    let field_count = header.fields.len();
    let categories: Vec<FieldCategory> = header.fields.iter().map(|f| f.category).collect();

    let mut ui_configuration = Vec::new();
    let Some(next) = reader.next_content_line()? else {
        return Err(StoreError::MissingBlock(MOLECULES_BLOCK));
    };
    let molecules_open = open_tag(MOLECULES_BLOCK);
    if next.trim() == open_tag(UI_CONFIGURATION_BLOCK) {
        let close = close_tag(UI_CONFIGURATION_BLOCK);
        loop {
            let Some(line) = reader.next_line()?.map(str::to_string) else {
                return Err(StoreError::MissingBlock(UI_CONFIGURATION_BLOCK));
            };
            if line.trim() == close {
                break;
            }
            ui_configuration.push(line);
        }
        reader.expect_open(MOLECULES_BLOCK)?;
    } else if next.trim() != molecules_open {
        return Err(StoreError::MissingBlock(MOLECULES_BLOCK));
    }

    let molecules = reader.read_rows(MOLECULES_BLOCK, header.counts.molecules, |r, columns| {
        if columns.len() != 4 + field_count {
            return Err(r.malformed(format!(
                "expected {} columns, found {}",
                4 + field_count,
                columns.len()
            )));
        }
        let values = columns[4..]
            .iter()
            .zip(&categories)
            .map(|(raw, &category)| FieldValue::parse_as(raw, category))
            .collect();
        Ok(MoleculeRow {
            index: parse_index(r, columns[0], "molecule index")?,
            coordinates: Some(columns[1]).filter(|c| !c.is_empty()).map(str::to_string),
            id_code: columns[2].to_string(),
            name: columns[3].to_string(),
            values,
        })
    })?;
    let molecule_count = molecules.iter().map(|m| m.index + 1).max().unwrap_or(0);

    let mut dictionary = FragmentDictionary::new();
    reader.read_block(UNIQUE_FRAGMENTS_BLOCK, header.counts.unique_fragments, |r, columns| {
        if columns.len() != 2 + FINGERPRINT_RADII {
            return Err(r.malformed(format!(
                "expected {} columns, found {}",
                2 + FINGERPRINT_RADII,
                columns.len()
            )));
        }
        let heavy_atoms = parse_index(r, columns[1], "heavy atom count")?;
        let fingerprint = Fingerprint::new(std::array::from_fn(|i| columns[2 + i].to_string()));
        let expected = dictionary.len();
        if dictionary.insert_loaded(columns[0], heavy_atoms, fingerprint) != expected {
            return Err(r.malformed(format!("duplicate fragment '{}'", columns[0])));
        }
        Ok(())
    })?;
    let fragment_count = dictionary.len();

    let check_fragment = |r: &LineReader<R>, index: FragmentIndex| {
        if index < fragment_count {
            Ok(index)
        } else {
            Err(r.out_of_range("fragment", index, fragment_count))
        }
    };
    let check_molecule = |r: &LineReader<R>, index: usize| {
        if index < molecule_count {
            Ok(index)
        } else {
            Err(r.out_of_range("molecule", index, molecule_count))
        }
    };
    let atoms_of = |index: FragmentIndex| dictionary.heavy_atoms(index).unwrap_or_default();

    let fragments = reader.read_block(FRAGMENTS_BLOCK, header.counts.fragments, |r, columns| {
        let [key1, key2, value, cut, molecule] = columns else {
            return Err(r.malformed("fragment rows need 5 columns"));
        };
        let key1 = check_fragment(r, parse_index(r, key1, "key")?)?;
        let key2 = parse_optional_index(key2)
            .ok_or_else(|| r.malformed(format!("key '{}' is not an index", key2)))?
            .map(|k| check_fragment(r, k))
            .transpose()?;
        let keys = match key2 {
            Some(key2) => KeySet::double(key1, key2),
            None => KeySet::single(key1),
        };
        let cut = parse_index(r, cut, "cut type")?;
        if cut != keys.cut_type().as_u8() as usize {
            return Err(r.malformed(format!("cut type {} does not match the key count", cut)));
        }
        let value = check_fragment(r, parse_index(r, value, "value")?)?;
        let value_atoms = atoms_of(value);
        Ok(FragmentationRecord {
            molecule: check_molecule(r, parse_index(r, molecule, "molecule")?)?,
            keys,
            value,
            value_atoms,
            hydrogen_variant: value_atoms == 0,
        })
    })?;

    let pairs = reader.read_block(PAIRS_BLOCK, header.counts.pairs, |r, columns| {
        let [value1, size1, value2, size2, cut, count, examples] = columns else {
            return Err(r.malformed("pair rows need 7 columns"));
        };
        let cut_type = u8::try_from(parse_index(r, cut, "cut type")?)
            .ok()
            .and_then(CutType::from_u8)
            .ok_or_else(|| r.malformed(format!("invalid cut type '{}'", cut)))?;
        let examples = parse_examples(examples)
            .ok_or_else(|| r.malformed("examples must be 'm1,m2' pairs separated by '|'"))?;
        if examples.len() != parse_index(r, count, "example count")? {
            return Err(r.malformed("example count does not match the example list"));
        }
        for &(m1, m2) in &examples {
            check_molecule(r, m1)?;
            check_molecule(r, m2)?;
        }
        Ok(PairRow {
            key: MmpKey {
                value1: check_fragment(r, parse_index(r, value1, "value")?)?,
                value1_atoms: parse_index(r, size1, "value size")?,
                value2: check_fragment(r, parse_index(r, value2, "value")?)?,
                value2_atoms: parse_index(r, size2, "value size")?,
                cut_type,
            },
            examples,
        })
    })?;

    info!(
        molecules = molecules.len(),
        unique_fragments = dictionary.len(),
        fragments = fragments.len(),
        pairs = pairs.len(),
        "Data set loaded."
    );
    Ok(LoadedTables {
        header,
        ui_configuration,
        molecules,
        dictionary,
        fragments,
        pairs,
    })
}

pub fn read_tables_from_path<P: AsRef<Path>>(path: P) -> Result<LoadedTables, StoreError> {
    let file = File::open(path)?;
    read_tables(BufReader::new(file))
}
