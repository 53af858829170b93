use crate::core::canonical::Canonicalizer;
use crate::core::fields::{
    FieldCategory, FieldClassifier, FieldInfo, FieldValue, PotencyConversion, potency_field,
};
use crate::core::io::source::MoleculeSource;
use crate::core::models::ids::MoleculeIndex;
use crate::core::models::molecule::Molecule;
use crate::engine::config::BuildConfig;
use crate::engine::dictionary::FragmentDictionary;
use crate::engine::enumerator::Enumerator;
use crate::engine::error::EngineError;
use crate::engine::fragmenter::Fragmenter;
use crate::engine::pair_index::PairIndex;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::store::error::StoreError;
use crate::store::format::MoleculeRow;
use crate::store::writer::DataSetWriter;
use std::collections::HashMap;
use std::io::Write;
use tracing::{info, instrument, warn};

/// Outcome of a completed build.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BuildSummary {
    /// Unique structures (molecule indices).
    pub molecules: usize,
    /// Accepted input rows, duplicates of a structure included.
    pub rows: usize,
    /// Input records skipped as malformed.
    pub skipped: usize,
    pub unique_fragments: usize,
    pub fragment_rows: usize,
    pub pairs: usize,
}

struct RawRow {
    index: MoleculeIndex,
    id_code: String,
    coordinates: Option<String>,
    name: String,
    fields: Vec<String>,
}

struct Ingested {
    rows: Vec<RawRow>,
    structures: Vec<Molecule>,
    classifier: FieldClassifier,
    skipped: usize,
}

/// Builds a data set from `source` and writes it to `out`.
///
/// Recoverable input errors skip the offending record; any other error aborts the
/// build before the file is written.
#[instrument(skip_all, name = "build_workflow", fields(name = %config.dataset_name))]
pub fn run<S, W>(
    source: S,
    config: &BuildConfig,
    canonicalizer: &dyn Canonicalizer,
    reporter: &ProgressReporter,
    out: &mut W,
) -> Result<BuildSummary, EngineError>
where
    S: MoleculeSource,
    W: Write,
{
    let field_names = source.field_names().to_vec();
    info!(fields = field_names.len(), "Starting data set build.");

    // === Phase 1: Read and group input ===
    let ingested = reporter.phase("Reading Molecules", || ingest(source, field_names.len()))?;
    let (fields, conversions) = describe_fields(&field_names, &ingested.classifier);
    info!(
        rows = ingested.rows.len(),
        molecules = ingested.structures.len(),
        skipped = ingested.skipped,
        "Input read."
    );

    let mut writer = DataSetWriter::new(
        &config.dataset_name,
        config.fragmentation.keys_min_atoms,
        Vec::new(),
    )?
    .with_ui_configuration(config.ui_configuration.clone());

    // === Phase 2: Fragmentation and pair indexing ===
    let mut dictionary = FragmentDictionary::new();
    let mut pair_index = PairIndex::new();
    reporter.phase("Fragmenting", || {
        fragment_all(
            &ingested.structures,
            config,
            canonicalizer,
            reporter,
            &mut dictionary,
            &mut pair_index,
            &mut writer,
        )
    })?;
    info!(
        unique_fragments = dictionary.len(),
        fragment_rows = writer.fragment_rows(),
        "Fragmentation complete."
    );

    // === Phase 3: Matched pair enumeration ===
    let pairs = reporter.phase("Enumerating Pairs", || {
        Enumerator::new(&pair_index).run(reporter, |pairs| writer.add_pairs(&pairs))
    })?;

    // === Phase 4: Fingerprints ===
    reporter.phase("Fingerprinting", || dictionary.compute_fingerprints(canonicalizer))?;

    // === Phase 5: Write ===
    let molecules: Vec<MoleculeRow> = ingested
        .rows
        .into_iter()
        .map(|raw| MoleculeRow {
            index: raw.index,
            coordinates: raw.coordinates,
            id_code: raw.id_code,
            name: raw.name,
            values: raw
                .fields
                .iter()
                .zip(fields.iter().zip(&conversions))
                .map(|(cell, (info, conversion))| {
                    let value = FieldValue::parse_as(cell, info.category);
                    match conversion {
                        Some(conversion) => conversion.apply(&value),
                        None => value,
                    }
                })
                .collect(),
        })
        .collect();
    writer.set_fields(fields);
    let counts = reporter.phase("Writing", || writer.finish(&molecules, &dictionary, out))?;

    let summary = BuildSummary {
        molecules: ingested.structures.len(),
        rows: counts.molecules,
        skipped: ingested.skipped,
        unique_fragments: counts.unique_fragments,
        fragment_rows: counts.fragments,
        pairs,
    };
    info!(
        molecules = summary.molecules,
        fragments = summary.fragment_rows,
        pairs = summary.pairs,
        "Data set build complete."
    );
    Ok(summary)
}

fn ingest<S: MoleculeSource>(source: S, field_count: usize) -> Result<Ingested, EngineError> {
    let mut ingested = Ingested {
        rows: Vec::new(),
        structures: Vec::new(),
        classifier: FieldClassifier::new(field_count),
        skipped: 0,
    };
    let mut by_id: HashMap<String, MoleculeIndex> = HashMap::new();

    for record in source {
        let record = match record {
            Ok(record) => record,
            Err(e) if e.is_recoverable() => {
                warn!(error = %e, "Skipping input record.");
                ingested.skipped += 1;
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        for (field, cell) in record.fields.iter().enumerate() {
            ingested.classifier.observe(field, &FieldValue::parse(cell));
        }
        let next = ingested.structures.len();
        let index = *by_id.entry(record.id_code.clone()).or_insert(next);
        if index == next {
            ingested.structures.push(record.molecule);
        }
        ingested.rows.push(RawRow {
            index,
            id_code: record.id_code,
            coordinates: record.coordinates,
            name: record.name,
            fields: record.fields,
        });
    }
    Ok(ingested)
}

fn describe_fields(
    names: &[String],
    classifier: &FieldClassifier,
) -> (Vec<FieldInfo>, Vec<Option<PotencyConversion>>) {
    names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let category = classifier.category(i);
            let potency = (category == FieldCategory::Numeric)
                .then(|| potency_field(name))
                .flatten();
            match potency {
                Some((potency_name, conversion)) => (
                    FieldInfo {
                        name: potency_name,
                        long_name: name.clone(),
                        category,
                    },
                    Some(conversion),
                ),
                None => (
                    FieldInfo {
                        name: name.clone(),
                        long_name: name.clone(),
                        category,
                    },
                    None,
                ),
            }
        })
        .unzip()
}

fn fragment_all(
    structures: &[Molecule],
    config: &BuildConfig,
    canonicalizer: &dyn Canonicalizer,
    reporter: &ProgressReporter,
    dictionary: &mut FragmentDictionary,
    pair_index: &mut PairIndex,
    writer: &mut DataSetWriter,
) -> Result<(), StoreError> {
    let fragmenter = Fragmenter::new(canonicalizer, &config.fragmentation);
    reporter.report(Progress::TaskStart {
        total_steps: structures.len() as u64,
    });
    for (index, molecule) in structures.iter().enumerate() {
        let result = fragmenter.fragment(index, molecule, dictionary);
        for record in &result.records {
            if pair_index.insert_record(record) {
                writer.add_fragment(record)?;
            }
        }
        reporter.report(Progress::TaskIncrement);
    }
    reporter.report(Progress::TaskFinish);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::canonical::GraphCodec;
    use crate::core::io::source::{MemorySource, MoleculeRecord};
    use crate::engine::config::BuildConfigBuilder;
    use crate::engine::records::KeySet;
    use crate::query::dataset::DataSet;
    use std::io::Cursor;

    const RING: &str = "0:1.1:2.2:3.3:4.4:5.5:0";

    fn record(codec: &GraphCodec, code: &str, name: &str, fields: &[&str]) -> MoleculeRecord {
        let molecule = codec.parse(code).unwrap();
        MoleculeRecord {
            id_code: codec.canonicalize(&molecule),
            coordinates: None,
            name: name.to_string(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
            molecule,
        }
    }

    fn source(codec: &GraphCodec) -> MemorySource {
        let toluene = format!("C*.C*H1.C*H1.C*H1.C*H1.C*H1.CH3|{}.0-6", RING);
        let ethylbenzene = format!("C*.C*H1.C*H1.C*H1.C*H1.C*H1.CH2.CH3|{}.0-6.6-7", RING);
        let chlorobenzene = format!("C*.C*H1.C*H1.C*H1.C*H1.C*H1.Cl|{}.0-6", RING);
        MemorySource::new(
            vec!["IC50_uM".into(), "Series".into()],
            vec![
                record(codec, &toluene, "toluene", &["1", "A"]),
                record(codec, &ethylbenzene, "ethylbenzene", &["0.1", "A"]),
                record(codec, &chlorobenzene, "chlorobenzene", &[">10", "B"]),
                record(codec, &toluene, "toluene again", &["10", "A"]),
            ],
        )
    }

    fn build(codec: &GraphCodec) -> (BuildSummary, Vec<u8>) {
        let config = BuildConfigBuilder::new().dataset_name("benzenes").build().unwrap();
        let mut out = Vec::new();
        let summary = run(source(codec), &config, codec, &ProgressReporter::new(), &mut out).unwrap();
        (summary, out)
    }

    #[test]
    fn build_groups_duplicate_structures() {
        let codec = GraphCodec::new();
        let (summary, _) = build(&codec);
        assert_eq!(summary.rows, 4);
        assert_eq!(summary.molecules, 3);
        assert_eq!(summary.skipped, 0);
        assert!(summary.pairs > 0);
        assert!(summary.fragment_rows > 0);
    }

    #[test]
    fn built_file_reads_back_and_rewrites_identically() {
        let codec = GraphCodec::new();
        let (summary, bytes) = build(&codec);

        let dataset = DataSet::read(Cursor::new(&bytes)).unwrap();
        assert_eq!(dataset.name(), "benzenes");
        assert_eq!(dataset.molecule_count(), summary.molecules);
        assert_eq!(dataset.pair_count(), summary.pairs);

        let mut rewritten = Vec::new();
        dataset.write_to(&mut rewritten).unwrap();
        assert_eq!(rewritten, bytes);
    }

    #[test]
    fn potency_fields_are_converted_and_renamed() {
        let codec = GraphCodec::new();
        let (_, bytes) = build(&codec);
        let dataset = DataSet::read(Cursor::new(&bytes)).unwrap();

        let fields = dataset.fields();
        assert_eq!(fields[0].name, "pIC50");
        assert_eq!(fields[0].long_name, "IC50_uM");
        assert_eq!(fields[0].category, FieldCategory::Numeric);
        assert_eq!(fields[1].category, FieldCategory::Text);

        // Toluene rows (1 uM and 10 uM) average to pIC50 5.5.
        let toluene = dataset.molecule_index(&dataset.molecule_rows()[0].id_code).unwrap();
        let mean = dataset.molecule_value(toluene, 0).unwrap();
        assert!((mean - 5.5).abs() < 1e-9);
        // The qualified chlorobenzene value is not exact.
        assert_eq!(dataset.molecule_value(2, 0), None);
    }

    #[test]
    fn loaded_chemical_space_matches_the_build_index() {
        let codec = GraphCodec::new();
        let (_, bytes) = build(&codec);
        let dataset = DataSet::read(Cursor::new(&bytes)).unwrap();

        let phenyl_id = codec.canonicalize(
            &codec
                .parse(&format!("C*.C*H1.C*H1.C*H1.C*H1.C*H1.R1|{}.0-6", RING))
                .unwrap(),
        );
        let phenyl = dataset.dictionary().index_of(&phenyl_id).unwrap();
        let molecules: std::collections::BTreeSet<_> = dataset
            .observations(&KeySet::single(phenyl))
            .iter()
            .map(|o| o.molecule)
            .collect();
        assert_eq!(molecules.into_iter().collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn malformed_records_are_skipped() {
        use crate::core::io::source::{TableLayout, TableSource};
        let codec = GraphCodec::new();
        let table = format!(
            "Structure\tName\tValue\n\
             C*.C*H1.C*H1.C*H1.C*H1.C*H1.CH3|{ring}.0-6\ttoluene\t1\n\
             not-a-structure\tbroken\t2\n\
             C*.C*H1.C*H1.C*H1.C*H1.C*H1.Cl|{ring}.0-6\tchlorobenzene\t3\n",
            ring = RING
        );
        let source = TableSource::from_reader(table.as_bytes(), &TableLayout::default(), &codec).unwrap();
        let config = BuildConfigBuilder::new().dataset_name("skips").build().unwrap();
        let mut out = Vec::new();
        let summary = run(source, &config, &codec, &ProgressReporter::new(), &mut out).unwrap();
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.molecules, 2);
    }

    #[test]
    fn build_reports_each_phase() {
        let codec = GraphCodec::new();
        let phases = std::sync::Mutex::new(Vec::new());
        let reporter = ProgressReporter::with_callback(Box::new(|event| {
            if let Progress::PhaseStart { name } = event {
                phases.lock().unwrap().push(name);
            }
        }));
        let config = BuildConfigBuilder::new().dataset_name("phases").build().unwrap();
        run(source(&codec), &config, &codec, &reporter, &mut Vec::new()).unwrap();
        drop(reporter);
        assert_eq!(
            phases.into_inner().unwrap(),
            vec!["Reading Molecules", "Fragmenting", "Enumerating Pairs", "Fingerprinting", "Writing"]
        );
    }
}
