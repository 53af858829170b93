use super::error::StoreError;
use super::format::*;
use super::spool::RowSpool;
use crate::core::fields::{FieldInfo, sanitize};
use crate::core::models::ids::MoleculeIndex;
use crate::engine::dictionary::FragmentDictionary;
use crate::engine::records::{FragmentationRecord, MatchedPair, MmpKey};
use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use std::io::Write;
use tracing::{info, instrument};

/// Streams a data set into the persisted format.
///
/// Fragment and pair rows are spooled while the build produces them; the molecule
/// table and the fragment dictionary are supplied when the file is finished.
pub struct DataSetWriter {
    dataset_name: String,
    keys_min_atoms: usize,
    fields: Vec<FieldInfo>,
    ui_configuration: Vec<String>,
    created: DateTime<FixedOffset>,
    fragments: RowSpool,
    pairs: RowSpool,
}

impl DataSetWriter {
    pub fn new(
        dataset_name: &str,
        keys_min_atoms: usize,
        fields: Vec<FieldInfo>,
    ) -> Result<Self, StoreError> {
        Ok(Self {
            dataset_name: dataset_name.to_string(),
            keys_min_atoms,
            fields,
            ui_configuration: Vec::new(),
            created: Utc::now().fixed_offset(),
            fragments: RowSpool::new()?,
            pairs: RowSpool::new()?,
        })
    }

    /// Sets the opaque UI configuration lines copied into the file.
    pub fn with_ui_configuration(mut self, lines: Vec<String>) -> Self {
        self.ui_configuration = lines;
        self
    }

    /// Overrides the creation timestamp (defaults to now).
    pub fn with_created(mut self, created: DateTime<FixedOffset>) -> Self {
        self.created = created;
        self
    }

    /// Replaces the field table, e.g. once classification has finished.
    pub fn set_fields(&mut self, fields: Vec<FieldInfo>) {
        self.fields = fields;
    }

    pub fn add_fragment(&mut self, record: &FragmentationRecord) -> Result<(), StoreError> {
        self.fragments.push_row(&format_fragment_row(record))?;
        Ok(())
    }

    pub fn add_pair<I>(&mut self, key: &MmpKey, examples: I) -> Result<(), StoreError>
    where
        I: ExactSizeIterator<Item = (MoleculeIndex, MoleculeIndex)>,
    {
        self.pairs.push_row(&format_pair_row(key, examples))?;
        Ok(())
    }

    pub fn add_pairs(&mut self, pairs: &[MatchedPair]) -> Result<(), StoreError> {
        for pair in pairs {
            let examples = pair.examples.iter().map(|e| (e.molecule1, e.molecule2));
            self.add_pair(&pair.key, examples)?;
        }
        Ok(())
    }

    pub fn fragment_rows(&self) -> usize {
        self.fragments.rows()
    }

    pub fn pair_rows(&self) -> usize {
        self.pairs.rows()
    }

    /// Writes the complete file.
    ///
    /// Every fragment in `dictionary` must have its fingerprint computed.
    ///
    /// # Return
    ///
    /// The row counts recorded in the header.
    #[instrument(skip_all, name = "data_set_write", fields(name = %self.dataset_name))]
    pub fn finish<W: Write>(
        self,
        molecules: &[MoleculeRow],
        dictionary: &FragmentDictionary,
        out: &mut W,
    ) -> Result<RowCounts, StoreError> {
        let counts = RowCounts {
            molecules: molecules.len(),
            unique_fragments: dictionary.len(),
            fragments: self.fragments.rows(),
            pairs: self.pairs.rows(),
        };

        writeln!(out, "{}", open_tag(FILE_INFO_BLOCK))?;
        let created = self.created.to_rfc3339_opts(SecondsFormat::Secs, true);
        let properties = [
            (KEY_VERSION, FORMAT_VERSION.to_string()),
            (KEY_CREATED, created),
            (KEY_DATASET_NAME, self.dataset_name.clone()),
            (KEY_KEYS_MIN_ATOMS, self.keys_min_atoms.to_string()),
            (KEY_MOLECULE_COUNT, counts.molecules.to_string()),
            (KEY_UNIQUE_FRAGMENT_COUNT, counts.unique_fragments.to_string()),
            (KEY_FRAGMENT_COUNT, counts.fragments.to_string()),
            (KEY_PAIR_COUNT, counts.pairs.to_string()),
        ];
        for (key, value) in &properties {
            writeln!(out, "{}", property_line(key, value))?;
        }
        writeln!(out, "{}", open_tag(FIELDS_BLOCK))?;
        for field in &self.fields {
            writeln!(
                out,
                "{}\t{}\t{}",
                sanitize(&field.name),
                sanitize(&field.long_name),
                field.category
            )?;
        }
        writeln!(out, "{}", close_tag(FIELDS_BLOCK))?;
        writeln!(out, "{}", close_tag(FILE_INFO_BLOCK))?;

        if !self.ui_configuration.is_empty() {
            writeln!(out, "{}", open_tag(UI_CONFIGURATION_BLOCK))?;
            for line in &self.ui_configuration {
                writeln!(out, "{}", line)?;
            }
            writeln!(out, "{}", close_tag(UI_CONFIGURATION_BLOCK))?;
        }

        writeln!(out, "{}", open_tag(MOLECULES_BLOCK))?;
        for row in molecules {
            writeln!(out, "{}", format_molecule_row(row))?;
        }
        writeln!(out, "{}", close_tag(MOLECULES_BLOCK))?;

        writeln!(out, "{}", open_tag(UNIQUE_FRAGMENTS_BLOCK))?;
        for (index, id, heavy_atoms) in dictionary.iter() {
            let fingerprint = dictionary
                .cached_fingerprint(index)
                .ok_or(StoreError::MissingFingerprint(index))?;
            writeln!(out, "{}", format_unique_fragment_row(id, heavy_atoms, fingerprint))?;
        }
        writeln!(out, "{}", close_tag(UNIQUE_FRAGMENTS_BLOCK))?;

        writeln!(out, "{}", open_tag(FRAGMENTS_BLOCK))?;
        self.fragments.drain_into(out)?;
        writeln!(out, "{}", close_tag(FRAGMENTS_BLOCK))?;

        writeln!(out, "{}", open_tag(PAIRS_BLOCK))?;
        self.pairs.drain_into(out)?;
        writeln!(out, "{}", close_tag(PAIRS_BLOCK))?;
        out.flush()?;

        info!(
            molecules = counts.molecules,
            unique_fragments = counts.unique_fragments,
            fragments = counts.fragments,
            pairs = counts.pairs,
            "Data set written."
        );
        Ok(counts)
    }
}
