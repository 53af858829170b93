use super::dataset::DataSet;
use super::engine::{ExampleMolecule, Transformation};
use super::error::QueryError;
use crate::core::fields::{FieldCategory, sanitize};
use crate::store::format::VALUE_PRECISION;
use std::io::Write;
use tracing::{debug, instrument};

const FILE_INFO_OPEN: &str = "<datawarrior-fileinfo>";
const FILE_INFO_CLOSE: &str = "</datawarrior-fileinfo>";
const EXPORT_VERSION: &str = "3.3";
const VIRTUAL_NAME: &str = "virtual";

/// Writes a transformation listing as a DataWarrior-style table.
///
/// A file-info header carrying the row count is followed by one tab-delimited row
/// per example, virtual examples included. Every numeric field contributes the
/// values of both molecules and their delta.
///
/// # Return
///
/// The number of example rows written.
#[instrument(skip_all, name = "transformation_export")]
pub fn export_transformations<W: Write>(
    dataset: &DataSet,
    transformations: &[Transformation],
    mut out: W,
) -> Result<usize, QueryError> {
    let rows: usize = transformations.iter().map(|t| t.examples.len()).sum();
    writeln!(out, "{}", FILE_INFO_OPEN)?;
    writeln!(out, "<version=\"{}\">", EXPORT_VERSION)?;
    writeln!(out, "<rowcount=\"{}\">", rows)?;
    writeln!(out, "{}", FILE_INFO_CLOSE)?;

    let numeric: Vec<(usize, &str)> = dataset
        .fields()
        .iter()
        .enumerate()
        .filter(|(_, f)| f.category == FieldCategory::Numeric)
        .map(|(i, f)| (i, f.name.as_str()))
        .collect();

    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .quote_style(csv::QuoteStyle::Never)
        .from_writer(out);

    let mut header: Vec<String> = [
        "Structure 1",
        "Name 1",
        "Structure 2",
        "Name 2",
        "Value 1",
        "Value 2",
        "Similarity",
        "Virtual",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    for (_, name) in &numeric {
        let name = sanitize(name);
        header.push(format!("{} 1", name));
        header.push(format!("{} 2", name));
        header.push(format!("Delta {}", name));
    }
    writer.write_record(&header)?;

    let dictionary = dataset.dictionary();
    for transformation in transformations {
        let value1 = dictionary.id(transformation.value1).unwrap_or_default();
        for example in &transformation.examples {
            let (id1, name1) = describe(dataset, &example.molecule1);
            let (id2, name2) = describe(dataset, &example.molecule2);
            let mut record = vec![
                id1,
                name1,
                id2,
                name2,
                value1.to_string(),
                transformation.value2_id.clone(),
                example.similarity.to_string(),
                example.is_virtual().to_string(),
            ];
            for &(field, _) in &numeric {
                let v1 = example
                    .molecule1
                    .index()
                    .and_then(|m| dataset.molecule_value(m, field));
                let v2 = example
                    .molecule2
                    .index()
                    .and_then(|m| dataset.molecule_value(m, field));
                record.push(format_value(v1));
                record.push(format_value(v2));
                record.push(format_value(v1.zip(v2).map(|(a, b)| b - a)));
            }
            writer.write_record(&record)?;
        }
    }
    writer.flush()?;
    debug!(rows, "Transformation listing exported.");
    Ok(rows)
}

fn describe(dataset: &DataSet, molecule: &ExampleMolecule) -> (String, String) {
    match molecule {
        ExampleMolecule::Stored(index) => {
            let row = dataset.rows_of(*index).next();
            (
                row.map(|r| r.id_code.clone()).unwrap_or_default(),
                row.map(|r| sanitize(&r.name)).unwrap_or_default(),
            )
        }
        ExampleMolecule::Virtual(id) => (id.clone(), VIRTUAL_NAME.to_string()),
    }
}

fn format_value(value: Option<f64>) -> String {
    value.map_or_else(String::new, |v| format!("{:.*}", VALUE_PRECISION, v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::canonical::{Canonicalizer, GraphCodec};
    use crate::core::io::source::{MemorySource, MoleculeRecord};
    use crate::engine::config::BuildConfigBuilder;
    use crate::engine::progress::ProgressReporter;
    use crate::query::engine::{QueryEngine, SortBy, TransformationQuery};
    use crate::workflows::build;
    use std::io::Cursor;

    const RING: &str = "0:1.1:2.2:3.3:4.4:5.5:0";

    fn id(codec: &GraphCodec, code: &str) -> String {
        codec.canonicalize(&codec.parse(code).unwrap())
    }

    fn dataset(codec: &GraphCodec) -> DataSet {
        let rows = [
            (format!("C*.C*H1.C*H1.C*H1.C*H1.C*H1.CH3|{}.0-6", RING), "toluene", "5.1"),
            (format!("C*.C*H1.C*H1.C*H1.C*H1.C*H1.Cl|{}.0-6", RING), "chlorobenzene", "6.3"),
        ];
        let records = rows
            .iter()
            .map(|(code, name, value)| {
                let molecule = codec.parse(code).unwrap();
                MoleculeRecord {
                    id_code: codec.canonicalize(&molecule),
                    coordinates: None,
                    name: name.to_string(),
                    fields: vec![value.to_string()],
                    molecule,
                }
            })
            .collect();
        let source = MemorySource::new(vec!["pKi".into()], records);
        let config = BuildConfigBuilder::new().dataset_name("export").build().unwrap();
        let mut bytes = Vec::new();
        build::run(source, &config, codec, &ProgressReporter::new(), &mut bytes).unwrap();
        DataSet::read(Cursor::new(bytes)).unwrap()
    }

    #[test]
    fn export_writes_header_and_one_row_per_example() {
        let codec = GraphCodec::new();
        let dataset = dataset(&codec);
        let engine = QueryEngine::new(&dataset, &codec);
        let query = TransformationQuery {
            molecule_id: dataset.molecule_rows()[0].id_code.clone(),
            keys: vec![id(&codec, &format!("C*.C*H1.C*H1.C*H1.C*H1.C*H1.R1|{}.0-6", RING))],
            value: id(&codec, "CH3.R1|0-1"),
            min_delta: 0,
            max_delta: 0,
            sort_by: SortBy::ExampleCount,
        };
        let transformations = engine.transformations(&query);
        assert_eq!(transformations.len(), 1);

        let mut out = Vec::new();
        let rows = export_transformations(&dataset, &transformations, &mut out).unwrap();
        assert_eq!(rows, 1);

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], FILE_INFO_OPEN);
        assert_eq!(lines[2], "<rowcount=\"1\">");
        assert_eq!(lines[3], FILE_INFO_CLOSE);
        assert!(lines[4].ends_with("pKi 1\tpKi 2\tDelta pKi"));

        let cells: Vec<&str> = lines[5].split('\t').collect();
        assert_eq!(cells[1], "toluene");
        assert_eq!(cells[3], "chlorobenzene");
        assert_eq!(cells[6], "6");
        assert_eq!(cells[7], "false");
        assert_eq!(&cells[8..], ["5.1000", "6.3000", "1.2000"]);
    }

    #[test]
    fn virtual_examples_are_exported_without_values() {
        let codec = GraphCodec::new();
        let dataset = dataset(&codec);
        let engine = QueryEngine::new(&dataset, &codec);
        let ethylbenzene = id(&codec, &format!("C*.C*H1.C*H1.C*H1.C*H1.C*H1.CH2.CH3|{}.0-6.6-7", RING));
        let query = TransformationQuery {
            molecule_id: ethylbenzene.clone(),
            keys: vec![id(&codec, &format!("C*.C*H1.C*H1.C*H1.C*H1.C*H1.CH2.R1|{}.0-6.6-7", RING))],
            value: id(&codec, "CH3.R1|0-1"),
            min_delta: 0,
            max_delta: 0,
            sort_by: SortBy::ExampleCount,
        };
        let transformations = engine.transformations(&query);
        assert_eq!(transformations.len(), 1);
        assert_eq!(transformations[0].example_count(), 1);

        let mut out = Vec::new();
        let rows = export_transformations(&dataset, &transformations, &mut out).unwrap();
        assert_eq!(rows, 2);
        let text = String::from_utf8(out).unwrap();
        let row: Vec<&str> = text
            .lines()
            .skip(5)
            .map(|line| line.split('\t').collect::<Vec<_>>())
            .find(|cells| cells[7] == "true")
            .unwrap();
        assert_eq!(row[0], ethylbenzene);
        assert_eq!(row[1], VIRTUAL_NAME);
        assert_eq!(row[3], VIRTUAL_NAME);
        assert_eq!(&row[8..], ["", "", ""]);
    }
}
