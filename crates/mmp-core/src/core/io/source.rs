use crate::core::canonical::{CanonicalError, Canonicalizer};
use crate::core::models::molecule::Molecule;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use thiserror::Error;

/// One input row: a structure with its display name and raw field values.
#[derive(Debug, Clone)]
pub struct MoleculeRecord {
    /// Canonical structure ID.
    pub id_code: String,
    /// Optional encoded 2D coordinates, passed through untouched.
    pub coordinates: Option<String>,
    pub name: String,
    /// Raw values in the order of [`MoleculeSource::field_names`].
    pub fields: Vec<String>,
    /// The materialized molecule used for fragmentation.
    pub molecule: Molecule,
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Table error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Required column '{0}' not found in table header")]
    MissingColumn(String),
    #[error("Malformed record on row {row}: {reason}")]
    Malformed { row: usize, reason: String },
}

impl SourceError {
    /// Malformed records are skipped; everything else aborts the input.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Malformed { .. })
    }
}

/// A stream of molecule records, the contract between file parsers and the
/// build workflow.
pub trait MoleculeSource: Iterator<Item = Result<MoleculeRecord, SourceError>> {
    /// Names of the data fields carried by every record.
    fn field_names(&self) -> &[String];
}

/// An in-memory source, mostly useful for embedding and tests.
pub struct MemorySource {
    field_names: Vec<String>,
    records: std::vec::IntoIter<MoleculeRecord>,
}

impl MemorySource {
    pub fn new(field_names: Vec<String>, records: Vec<MoleculeRecord>) -> Self {
        Self {
            field_names,
            records: records.into_iter(),
        }
    }
}

impl Iterator for MemorySource {
    type Item = Result<MoleculeRecord, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.records.next().map(Ok)
    }
}

impl MoleculeSource for MemorySource {
    fn field_names(&self) -> &[String] {
        &self.field_names
    }
}

/// Column roles of a tab-delimited molecule table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableLayout {
    pub structure_column: String,
    pub name_column: Option<String>,
    pub coordinates_column: Option<String>,
}

impl Default for TableLayout {
    fn default() -> Self {
        Self {
            structure_column: "Structure".to_string(),
            name_column: Some("Name".to_string()),
            coordinates_column: Some("Coordinates".to_string()),
        }
    }
}

/// Reads molecules from a tab-delimited table with a header row.
///
/// The structure column is parsed with the supplied canonicalizer and the record's
/// ID is the canonical ID of the hydrogen-stripped molecule. Every column that is
/// not the structure, name or coordinates column becomes a data field.
pub struct TableSource<'a, R: Read> {
    records: csv::StringRecordsIntoIter<R>,
    canonicalizer: &'a dyn Canonicalizer,
    structure_col: usize,
    name_col: Option<usize>,
    coordinates_col: Option<usize>,
    field_cols: Vec<usize>,
    field_names: Vec<String>,
    row: usize,
}

impl<'a> TableSource<'a, File> {
    pub fn from_path<P: AsRef<Path>>(
        path: P,
        layout: &TableLayout,
        canonicalizer: &'a dyn Canonicalizer,
    ) -> Result<Self, SourceError> {
        let file = File::open(path)?;
        Self::from_reader(file, layout, canonicalizer)
    }
}

impl<'a, R: Read> TableSource<'a, R> {
    pub fn from_reader(
        reader: R,
        layout: &TableLayout,
        canonicalizer: &'a dyn Canonicalizer,
    ) -> Result<Self, SourceError> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .flexible(true)
            .has_headers(true)
            .from_reader(reader);
        let headers = reader.headers()?.clone();
        let find = |name: &str| headers.iter().position(|h| h.trim() == name);

        let structure_col = find(&layout.structure_column)
            .ok_or_else(|| SourceError::MissingColumn(layout.structure_column.clone()))?;
        let name_col = layout.name_column.as_deref().and_then(find);
        let coordinates_col = layout.coordinates_column.as_deref().and_then(find);

        let field_cols: Vec<usize> = (0..headers.len())
            .filter(|&i| i != structure_col && Some(i) != name_col && Some(i) != coordinates_col)
            .collect();
        let field_names = field_cols
            .iter()
            .map(|&i| headers.get(i).unwrap_or_default().trim().to_string())
            .collect();

        Ok(Self {
            records: reader.into_records(),
            canonicalizer,
            structure_col,
            name_col,
            coordinates_col,
            field_cols,
            field_names,
            row: 1,
        })
    }

    fn build_record(&self, record: &csv::StringRecord) -> Result<MoleculeRecord, SourceError> {
        let malformed = |reason: String| SourceError::Malformed {
            row: self.row,
            reason,
        };
        let structure = record.get(self.structure_col).unwrap_or_default().trim();
        if structure.is_empty() {
            return Err(malformed("missing structure".to_string()));
        }
        let molecule = self
            .canonicalizer
            .parse(structure)
            .map_err(|e: CanonicalError| malformed(e.to_string()))?
            .strip_hydrogens();
        if molecule.atom_count() == 0 {
            return Err(malformed("structure has no heavy atoms".to_string()));
        }

        let name = self
            .name_col
            .and_then(|i| record.get(i))
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map_or_else(|| format!("Molecule {}", self.row), str::to_string);
        let coordinates = self
            .coordinates_col
            .and_then(|i| record.get(i))
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);
        let fields = self
            .field_cols
            .iter()
            .map(|&i| record.get(i).unwrap_or_default().to_string())
            .collect();

        Ok(MoleculeRecord {
            id_code: self.canonicalizer.canonicalize(&molecule),
            coordinates,
            name,
            fields,
            molecule,
        })
    }
}

impl<R: Read> Iterator for TableSource<'_, R> {
    type Item = Result<MoleculeRecord, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = self.records.next()?;
        self.row += 1;
        Some(match record {
            Ok(record) => self.build_record(&record),
            Err(e) => Err(SourceError::Csv(e)),
        })
    }
}

impl<R: Read> MoleculeSource for TableSource<'_, R> {
    fn field_names(&self) -> &[String] {
        &self.field_names
    }
}
