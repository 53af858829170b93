use super::pair_index::{Observation, PairIndex};
use super::progress::{Progress, ProgressReporter};
use super::records::{KeySet, MatchedPair, MmpKey, PairExample};
use itertools::Itertools;
use std::collections::BTreeMap;
use tracing::{debug, info, instrument};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Size combinations evaluated per parallel batch.
const COMBINATIONS_PER_BATCH: usize = 64;

/// Enumerates matched molecular pairs from a populated [`PairIndex`].
///
/// Every transformation `(value1, size1) -> (value2, size2)` belongs to exactly one
/// size combination, so the pairs of a combination are complete once it has been
/// processed and can be streamed to the caller.
pub struct Enumerator<'a> {
    index: &'a PairIndex,
}

impl<'a> Enumerator<'a> {
    pub fn new(index: &'a PairIndex) -> Self {
        Self { index }
    }

    /// All ordered `(size1, size2)` combinations with both sizes in `0..=max`.
    pub fn size_combinations(&self) -> Vec<(usize, usize)> {
        match self.index.max_value_atoms() {
            Some(max) => (0..=max).cartesian_product(0..=max).collect(),
            None => Vec::new(),
        }
    }

    /// Enumerates the pairs whose first value has `size1` and whose second value
    /// has `size2` heavy atoms, ordered by transformation.
    pub fn pairs_for_sizes(&self, size1: usize, size2: usize) -> Vec<MatchedPair> {
        let (Some(left), Some(right)) = (self.index.bucket(size1), self.index.bucket(size2)) else {
            return Vec::new();
        };

        let mut grouped: BTreeMap<MmpKey, Vec<PairExample>> = BTreeMap::new();
        let mut push = |keys: KeySet, o1: &Observation, o2: &Observation| {
            let key = MmpKey {
                value1: o1.value,
                value1_atoms: size1,
                value2: o2.value,
                value2_atoms: size2,
                cut_type: keys.cut_type(),
            };
            grouped.entry(key).or_default().push(PairExample {
                molecule1: o1.molecule,
                molecule2: o2.molecule,
                keys,
            });
        };

        for keys in left.keys().sorted_unstable() {
            let first = &left[keys];
            if size1 != size2 {
                let Some(second) = right.get(keys) else {
                    continue;
                };
                for (o1, o2) in first.iter().cartesian_product(second.iter()) {
                    push(*keys, o1, o2);
                }
            } else {
                for (o1, o2) in first.iter().tuple_combinations() {
                    if o1.value == o2.value {
                        continue;
                    }
                    push(*keys, o1, o2);
                    push(*keys, o2, o1);
                }
            }
        }

        grouped
            .into_iter()
            .map(|(key, examples)| MatchedPair { key, examples })
            .collect()
    }

    /// Runs the full enumeration, handing each size combination's pairs to `sink`
    /// in combination order.
    ///
    /// # Return
    ///
    /// The number of matched pairs produced, or the first error returned by `sink`.
    #[instrument(skip_all, name = "pair_enumeration_task")]
    pub fn run<F, E>(&self, reporter: &ProgressReporter, mut sink: F) -> Result<usize, E>
    where
        F: FnMut(Vec<MatchedPair>) -> Result<(), E>,
    {
        let combinations = self.size_combinations();
        info!(
            combinations = combinations.len(),
            "Starting matched pair enumeration."
        );
        reporter.report(Progress::TaskStart {
            total_steps: combinations.len() as u64,
        });

        let mut total = 0;
        for batch in combinations.chunks(COMBINATIONS_PER_BATCH) {
            #[cfg(not(feature = "parallel"))]
            let iterator = batch.iter();

            #[cfg(feature = "parallel")]
            let iterator = batch.par_iter();

            let results: Vec<Vec<MatchedPair>> = iterator
                .map(|&(size1, size2)| self.pairs_for_sizes(size1, size2))
                .collect();

            for (pairs, &(size1, size2)) in results.into_iter().zip(batch) {
                reporter.report(Progress::TaskIncrement);
                if pairs.is_empty() {
                    continue;
                }
                debug!(size1, size2, pairs = pairs.len(), "Size combination enumerated.");
                total += pairs.len();
                sink(pairs)?;
            }
        }

        reporter.report(Progress::TaskFinish);
        info!(pairs = total, "Matched pair enumeration complete.");
        Ok(total)
    }

    /// Collects every matched pair in memory.
    pub fn collect_all(&self) -> Vec<MatchedPair> {
        let mut all = Vec::new();
        let _ = self.run(&ProgressReporter::new(), |pairs| {
            all.extend(pairs);
            Ok::<(), std::convert::Infallible>(())
        });
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::canonical::{Canonicalizer, GraphCodec};
    use crate::engine::config::FragmentationConfig;
    use crate::engine::dictionary::FragmentDictionary;
    use crate::engine::fragmenter::Fragmenter;
    use std::collections::HashSet;

    const RING: &str = "0:1.1:2.2:3.3:4.4:5.5:0";

    fn obs(value: usize, molecule: usize) -> Observation {
        Observation { value, molecule }
    }

    fn index_of(codes: &[&str]) -> (PairIndex, FragmentDictionary) {
        let codec = GraphCodec::new();
        let config = FragmentationConfig::default();
        let fragmenter = Fragmenter::new(&codec, &config);
        let mut dict = FragmentDictionary::new();
        let mut index = PairIndex::new();
        for (i, code) in codes.iter().enumerate() {
            let molecule = codec.parse(code).unwrap();
            for record in fragmenter.fragment(i, &molecule, &mut dict).records {
                index.insert_record(&record);
            }
        }
        (index, dict)
    }

    fn benzenes() -> Vec<String> {
        ["CH3", "CH2.CH3", "Cl"]
            .iter()
            .map(|sub| {
                let extra = if sub.contains('.') { ".6-7" } else { "" };
                format!("C*.C*H1.C*H1.C*H1.C*H1.C*H1.{}|{}.0-6{}", sub, RING, extra)
            })
            .collect()
    }

    fn phenyl_pairs(pairs: &[MatchedPair], dict: &FragmentDictionary) -> HashSet<(usize, usize, usize, usize)> {
        pairs
            .iter()
            .flat_map(|p| p.examples.iter().map(move |e| (p, e)))
            .filter(|(_, e)| dict.heavy_atoms(e.keys.first()) == Some(6) && e.keys.second().is_none())
            .map(|(p, e)| (p.key.value1_atoms, p.key.value2_atoms, e.molecule1, e.molecule2))
            .collect()
    }

    #[test]
    fn methyl_ethyl_chloro_benzenes_pair_across_and_within_sizes() {
        let codes = benzenes();
        let refs: Vec<&str> = codes.iter().map(String::as_str).collect();
        let (index, dict) = index_of(&refs);
        let pairs = Enumerator::new(&index).collect_all();

        let found = phenyl_pairs(&pairs, &dict);
        let expected: HashSet<_> = [
            (1, 1, 0, 2),
            (1, 1, 2, 0),
            (1, 2, 0, 1),
            (1, 2, 2, 1),
            (2, 1, 1, 0),
            (2, 1, 1, 2),
        ]
        .into_iter()
        .collect();
        assert_eq!(found, expected);
    }

    #[test]
    fn no_pair_maps_a_fragment_onto_itself() {
        let codes = benzenes();
        let refs: Vec<&str> = codes.iter().map(String::as_str).collect();
        let (index, _) = index_of(&refs);
        let pairs = Enumerator::new(&index).collect_all();
        assert!(!pairs.is_empty());
        assert!(pairs.iter().all(|p| p.key.value1 != p.key.value2));
    }

    #[test]
    fn hydrogen_values_pair_with_substituents() {
        let benzene = format!("C*H1.C*H1.C*H1.C*H1.C*H1.C*H1|{}", RING);
        let toluene = format!("C*.C*H1.C*H1.C*H1.C*H1.C*H1.CH3|{}.0-6", RING);
        let (index, dict) = index_of(&[&benzene, &toluene]);
        let pairs = Enumerator::new(&index).collect_all();

        let hydrogen = dict
            .index_of(&GraphCodec::new().canonicalize(&crate::engine::fragmenter::hydrogen_fragment()))
            .unwrap();
        let h_to_methyl = pairs
            .iter()
            .find(|p| p.key.value1 == hydrogen && p.key.value2_atoms == 1)
            .unwrap();
        assert_eq!(h_to_methyl.examples.len(), 1);
        assert_eq!(
            (h_to_methyl.examples[0].molecule1, h_to_methyl.examples[0].molecule2),
            (0, 1)
        );
    }

    #[test]
    fn same_size_pairs_skip_identical_values_only() {
        let mut index = PairIndex::new();
        let key = KeySet::single(0);
        index.insert(key, 1, obs(5, 0));
        index.insert(key, 1, obs(5, 1));
        index.insert(key, 1, obs(6, 2));

        let pairs = Enumerator::new(&index).pairs_for_sizes(1, 1);
        let forward = pairs.iter().find(|p| p.key.value1 == 5).unwrap();
        let backward = pairs.iter().find(|p| p.key.value1 == 6).unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(forward.examples.len(), 2);
        assert_eq!(backward.examples.len(), 2);
    }

    #[test]
    fn cross_size_pairs_require_the_key_in_both_buckets() {
        let mut index = PairIndex::new();
        index.insert(KeySet::single(0), 1, obs(5, 0));
        index.insert(KeySet::single(1), 2, obs(6, 1));
        let enumerator = Enumerator::new(&index);
        assert!(enumerator.pairs_for_sizes(1, 2).is_empty());
        assert_eq!(enumerator.size_combinations().len(), 9);
    }

    #[test]
    fn run_streams_batches_and_reports_progress() {
        let mut index = PairIndex::new();
        let key = KeySet::double(0, 1);
        index.insert(key, 1, obs(5, 0));
        index.insert(key, 2, obs(6, 1));

        let increments = std::sync::atomic::AtomicUsize::new(0);
        let reporter = ProgressReporter::with_callback(Box::new(|event| {
            if matches!(event, Progress::TaskIncrement) {
                increments.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            }
        }));

        let mut batches = 0;
        let total = Enumerator::new(&index)
            .run(&reporter, |pairs| {
                batches += 1;
                assert!(pairs.iter().all(|p| p.key.cut_type == crate::engine::records::CutType::Double));
                Ok::<(), ()>(())
            })
            .unwrap();
        assert_eq!(total, 2);
        assert_eq!(batches, 2);
        assert_eq!(increments.load(std::sync::atomic::Ordering::Relaxed), 9);
    }

    #[test]
    fn sink_errors_abort_the_run() {
        let mut index = PairIndex::new();
        index.insert(KeySet::single(0), 1, obs(5, 0));
        index.insert(KeySet::single(0), 1, obs(6, 1));
        let result = Enumerator::new(&index).run(&ProgressReporter::new(), |_| Err("disk full"));
        assert_eq!(result, Err("disk full"));
    }
}
