use super::dataset::{DataSet, FieldMetadata};
use super::engine::{QueryEngine, Transformation, TransformationQuery};
use super::error::QueryError;
use super::export;
use crate::core::canonical::Canonicalizer;
use crate::store::format::MoleculeRow;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, RwLock};
use tracing::info;

/// Loaded data sets addressable by name.
///
/// Data sets are immutable once registered and shared through [`Arc`], so queries
/// from several threads never block one another; only registration takes the
/// write lock.
pub struct DataSetRegistry<C: Canonicalizer> {
    canonicalizer: C,
    datasets: RwLock<BTreeMap<String, Arc<DataSet>>>,
}

impl<C: Canonicalizer> DataSetRegistry<C> {
    pub fn new(canonicalizer: C) -> Self {
        Self {
            canonicalizer,
            datasets: RwLock::new(BTreeMap::new()),
        }
    }

    /// Registers a data set under its own name, replacing any previous one.
    pub fn insert(&self, dataset: DataSet) -> Arc<DataSet> {
        let dataset = Arc::new(dataset);
        let name = dataset.name().to_string();
        self.write().insert(name, Arc::clone(&dataset));
        dataset
    }

    /// Loads a persisted data set and registers it.
    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<Arc<DataSet>, QueryError> {
        let dataset = DataSet::load(path.as_ref())?;
        info!(
            name = dataset.name(),
            molecules = dataset.molecule_count(),
            pairs = dataset.pair_count(),
            "Data set loaded."
        );
        Ok(self.insert(dataset))
    }

    pub fn get(&self, name: &str) -> Result<Arc<DataSet>, QueryError> {
        self.read()
            .get(name)
            .cloned()
            .ok_or_else(|| QueryError::UnknownDataSet(name.to_string()))
    }

    pub fn remove(&self, name: &str) -> Option<Arc<DataSet>> {
        self.write().remove(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    pub fn chemical_space_size<S: AsRef<str>>(&self, name: &str, keys: &[S]) -> Result<usize, QueryError> {
        let dataset = self.get(name)?;
        Ok(QueryEngine::new(&dataset, &self.canonicalizer).chemical_space_size(keys))
    }

    pub fn chemical_space<S: AsRef<str>>(
        &self,
        name: &str,
        keys: &[S],
    ) -> Result<Vec<MoleculeRow>, QueryError> {
        let dataset = self.get(name)?;
        let rows = QueryEngine::new(&dataset, &self.canonicalizer)
            .chemical_space(keys)
            .into_iter()
            .cloned()
            .collect();
        Ok(rows)
    }

    pub fn transformations(
        &self,
        name: &str,
        query: &TransformationQuery,
    ) -> Result<Vec<Transformation>, QueryError> {
        let dataset = self.get(name)?;
        Ok(QueryEngine::new(&dataset, &self.canonicalizer).transformations(query))
    }

    /// Runs a transformation query and writes the listing as an export table.
    pub fn export_transformations<W: Write>(
        &self,
        name: &str,
        query: &TransformationQuery,
        out: W,
    ) -> Result<usize, QueryError> {
        let dataset = self.get(name)?;
        let transformations = QueryEngine::new(&dataset, &self.canonicalizer).transformations(query);
        export::export_transformations(&dataset, &transformations, out)
    }

    pub fn field_metadata(&self, name: &str) -> Result<Vec<FieldMetadata>, QueryError> {
        Ok(self.get(name)?.field_metadata().to_vec())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, Arc<DataSet>>> {
        self.datasets.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<String, Arc<DataSet>>> {
        self.datasets.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::canonical::GraphCodec;
    use crate::core::io::source::{MemorySource, MoleculeRecord};
    use crate::engine::config::BuildConfigBuilder;
    use crate::engine::progress::ProgressReporter;
    use crate::query::engine::SortBy;
    use crate::workflows::build;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const TOLUENE: &str = "C*.C*H1.C*H1.C*H1.C*H1.C*H1.CH3|0:1.1:2.2:3.3:4.4:5.5:0.0-6";
    const CHLOROBENZENE: &str = "C*.C*H1.C*H1.C*H1.C*H1.C*H1.Cl|0:1.1:2.2:3.3:4.4:5.5:0.0-6";
    const PHENYL: &str = "C*.C*H1.C*H1.C*H1.C*H1.C*H1.R1|0:1.1:2.2:3.3:4.4:5.5:0.0-6";

    fn id(codec: &GraphCodec, code: &str) -> String {
        codec.canonicalize(&codec.parse(code).unwrap())
    }

    fn built(name: &str) -> Vec<u8> {
        let codec = GraphCodec::new();
        let records = [(TOLUENE, "toluene", "5.1"), (CHLOROBENZENE, "chlorobenzene", "6.3")]
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
        let config = BuildConfigBuilder::new().dataset_name(name).build().unwrap();
        let mut bytes = Vec::new();
        build::run(
            MemorySource::new(vec!["pKi".into()], records),
            &config,
            &codec,
            &ProgressReporter::new(),
            &mut bytes,
        )
        .unwrap();
        bytes
    }

    #[test]
    fn queries_are_addressed_by_name() {
        let registry = DataSetRegistry::new(GraphCodec::new());
        registry.insert(DataSet::read(built("alpha").as_slice()).unwrap());

        let codec = GraphCodec::new();
        let phenyl = id(&codec, PHENYL);
        assert_eq!(registry.chemical_space_size("alpha", &[&phenyl]).unwrap(), 2);
        let names: Vec<_> = registry
            .chemical_space("alpha", &[&phenyl])
            .unwrap()
            .into_iter()
            .map(|row| row.name)
            .collect();
        assert!(names.contains(&"toluene".to_string()));
        assert!(matches!(
            registry.chemical_space_size("beta", &[&phenyl]),
            Err(QueryError::UnknownDataSet(name)) if name == "beta"
        ));
    }

    #[test]
    fn load_registers_and_remove_forgets() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&built("from-disk")).unwrap();

        let registry = DataSetRegistry::new(GraphCodec::new());
        let dataset = registry.load(file.path()).unwrap();
        assert_eq!(dataset.name(), "from-disk");
        assert_eq!(registry.names(), vec!["from-disk".to_string()]);

        assert!(registry.remove("from-disk").is_some());
        assert!(registry.get("from-disk").is_err());
    }

    #[test]
    fn registered_data_sets_are_shared_across_threads() {
        let registry = Arc::new(DataSetRegistry::new(GraphCodec::new()));
        registry.insert(DataSet::read(built("shared").as_slice()).unwrap());

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.get("shared").unwrap().molecule_count())
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), 2);
        }
    }

    fn methyl_to_chloro(codec: &GraphCodec) -> TransformationQuery {
        TransformationQuery {
            molecule_id: id(codec, TOLUENE),
            keys: vec![id(codec, PHENYL)],
            value: id(codec, "CH3.R1|0-1"),
            min_delta: 0,
            max_delta: 0,
            sort_by: SortBy::ExampleCount,
        }
    }

    #[test]
    fn export_is_addressed_by_name() {
        let registry = DataSetRegistry::new(GraphCodec::new());
        registry.insert(DataSet::read(built("alpha").as_slice()).unwrap());
        let query = methyl_to_chloro(&GraphCodec::new());

        let mut out = Vec::new();
        assert_eq!(registry.export_transformations("alpha", &query, &mut out).unwrap(), 1);
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("toluene\t"));
        assert!(text.contains("chlorobenzene\t"));

        let mut untouched = Vec::new();
        assert!(matches!(
            registry.export_transformations("beta", &query, &mut untouched),
            Err(QueryError::UnknownDataSet(name)) if name == "beta"
        ));
        assert!(untouched.is_empty());
    }

    #[test]
    fn field_metadata_is_addressed_by_name() {
        let registry = DataSetRegistry::new(GraphCodec::new());
        registry.insert(DataSet::read(built("alpha").as_slice()).unwrap());

        let metadata = registry.field_metadata("alpha").unwrap();
        assert_eq!(metadata.len(), 1);
        assert_eq!(metadata[0].info.name, "pKi");
        assert!(metadata[0].percentile_5.is_some());
        assert!(metadata[0].percentile_5 <= metadata[0].percentile_95);

        assert!(matches!(
            registry.field_metadata("beta"),
            Err(QueryError::UnknownDataSet(name)) if name == "beta"
        ));
    }
}
