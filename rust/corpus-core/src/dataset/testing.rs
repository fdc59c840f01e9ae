// rust/corpus-core/src/dataset/testing.rs

//! Shared fixtures and the property checks every dataset type must pass.

use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::SeedableRng;

use super::registry::DatasetRegistry;
use super::traits::{Dataset, Key, SliceSpec, TaskSet};
use crate::corpus::MemoryDataset;
use crate::error::CorpusError;
use crate::sample::{Sample, REF};

/// `n` in-memory samples `dummy-{i}` with a transcript each.
pub(crate) fn dummy_dataset(n: usize, use_cache: usize) -> MemoryDataset {
    prefixed_dataset("dummy", n, use_cache)
}

pub(crate) fn prefixed_dataset(prefix: &str, n: usize, use_cache: usize) -> MemoryDataset {
    let samples = (0..n)
        .map(|i| Sample::new(format!("{prefix}-{i}")).with_value(REF, format!("transcript {i}")))
        .collect();
    MemoryDataset::from_samples(samples, TaskSet::new(["asr"]), use_cache)
}

/// Sample ids of a dataset in iteration order.
pub(crate) fn ids(dataset: &dyn Dataset) -> Vec<String> {
    dataset
        .iter()
        .map(|s| s.map(|s| s.id().to_string()))
        .collect::<Result<_, _>>()
        .unwrap()
}

pub(crate) fn ids_of(samples: &[Sample]) -> Vec<String> {
    samples.iter().map(|s| s.id().to_string()).collect()
}

/// Runs the behavioral checks shared by every dataset type against fresh
/// instances built by `make`. The dataset must hold unique ids.
pub(crate) fn assert_dataset_contract<F>(make: F)
where
    F: Fn() -> Box<dyn Dataset>,
{
    let dataset = make();
    let len = dataset.length().unwrap();
    let all = ids(&*dataset);
    assert_eq!(all.len(), len, "length disagrees with iteration");
    assert_eq!(
        all.iter().collect::<HashSet<_>>().len(),
        len,
        "sample ids are not unique"
    );

    check_access(&*dataset, &all);
    check_derivations(&*dataset, &all);
    check_round_trip(&*dataset, &all);
    check_cache_transparency(&*dataset, &all, &*make());
    check_random_sample(&*dataset, &all);
    check_clean(&make);
}

fn check_access(dataset: &dyn Dataset, all: &[String]) {
    let len = all.len() as i64;
    for i in 0..len {
        let by_index = dataset.get(i).unwrap();
        assert_eq!(by_index.id(), all[i as usize]);
        assert_eq!(dataset.get(i - len).unwrap(), by_index);

        let by_key = dataset.getitem(Key::Index(i), 0).unwrap().into_sample().unwrap();
        assert_eq!(by_key, by_index);
    }
    for bad in [len, -len - 1] {
        assert!(
            matches!(
                dataset.get(bad).unwrap_err(),
                CorpusError::IndexOutOfRange { .. }
            ),
            "index {bad} should be out of range"
        );
    }
}

fn check_derivations(dataset: &dyn Dataset, all: &[String]) {
    let len = all.len();
    if len == 0 {
        return;
    }

    let full = dataset
        .getitem(Key::Slice(SliceSpec::full()), 0)
        .unwrap()
        .into_dataset()
        .unwrap();
    assert_eq!(ids(&*full), all);

    if len >= 2 {
        let stepped = dataset.slice(SliceSpec::new(Some(1), None, Some(3)), 0).unwrap();
        let expected: Vec<_> = all.iter().skip(1).step_by(3).cloned().collect();
        assert_eq!(ids(&*stepped), expected);
    }

    let last = len as i64 - 1;
    let picks = vec![last, 0, last, -1];
    let selected = dataset
        .getitem(Key::Indices(picks), 0)
        .unwrap()
        .into_dataset()
        .unwrap();
    let expected = vec![
        all[len - 1].clone(),
        all[0].clone(),
        all[len - 1].clone(),
        all[len - 1].clone(),
    ];
    assert_eq!(ids(&*selected), expected);
    assert_eq!(selected.task(), dataset.task());

    assert!(dataset.select(&[len as i64], 0).is_err());
}

fn check_round_trip(dataset: &dyn Dataset, all: &[String]) {
    let registry = DatasetRegistry::with_builtins();

    let pointer = dataset.to_pointer().unwrap();
    let restored = registry.dataset_from_pointer(&pointer).unwrap();
    assert_eq!(restored.type_name(), dataset.type_name());
    assert_eq!(restored.task(), dataset.task());
    assert_eq!(ids(&*restored), all);

    let dict = dataset.to_dict().unwrap();
    let rebuilt = registry.dataset_from_dict(&dataset.identity(), &dict).unwrap();
    assert_eq!(ids(&*rebuilt), all);
    assert_eq!(rebuilt.use_cache(), dataset.use_cache());
}

fn check_cache_transparency(dataset: &dyn Dataset, all: &[String], fresh: &dyn Dataset) {
    for i in (0..all.len() as i64).rev() {
        let first = dataset.get(i).unwrap();
        let again = dataset.get(i).unwrap();
        let uncached = fresh.get(i).unwrap();
        assert_eq!(first, again);
        assert_eq!(first, uncached);
        assert_eq!(first.value(REF), uncached.value(REF));
    }
}

fn check_random_sample(dataset: &dyn Dataset, all: &[String]) {
    let len = all.len();
    if len == 0 {
        return;
    }
    let mut rng = StdRng::seed_from_u64(17);
    let start = len / 3;
    let size = (len - start).min(5);

    let drawn = dataset
        .sample(size as i64, start as i64, Some(&mut rng), 0)
        .unwrap();
    let drawn_ids = ids(&*drawn);
    assert_eq!(drawn_ids.len(), size);
    assert_eq!(drawn_ids.iter().collect::<HashSet<_>>().len(), size);
    for id in &drawn_ids {
        assert!(all[start..].contains(id), "{id} drawn from before {start}");
    }

    let rest = dataset.sample(-1, start as i64, None, 0).unwrap();
    assert_eq!(ids(&*rest), all[start..].to_vec());

    let clamped = dataset.sample(len as i64 * 2, 0, None, 0).unwrap();
    assert_eq!(clamped.length().unwrap(), len);

    assert!(dataset.sample(1, len as i64, None, 0).is_err());
    assert!(dataset.sample(1, -1, None, 0).is_err());
}

fn check_clean<F>(make: &F)
where
    F: Fn() -> Box<dyn Dataset>,
{
    let cleaned = || {
        let mut dataset = make();
        dataset.clean();
        dataset
    };

    let mut dataset = cleaned();
    assert!(dataset.is_cleaned());
    assert!(dataset.length().unwrap_err().is_cleaned());
    assert!(dataset.get(0).unwrap_err().is_cleaned());
    assert!(dataset.select(&[0], 0).unwrap_err().is_cleaned());
    assert!(dataset.slice(SliceSpec::full(), 0).unwrap_err().is_cleaned());
    assert!(dataset.sample(1, 0, None, 0).unwrap_err().is_cleaned());
    assert!(dataset.to_dict().unwrap_err().is_cleaned());
    assert!(dataset.to_pointer().unwrap_err().is_cleaned());
    for key in [
        Key::Index(0),
        Key::Slice(SliceSpec::full()),
        Key::Indices(vec![0]),
    ] {
        assert!(matches!(dataset.getitem(key, 0), Err(e) if e.is_cleaned()));
    }
    dataset.clean();
    assert!(dataset.is_cleaned());

    assert!(matches!(cleaned().concat(make(), 0), Err(e) if e.is_cleaned()));
    assert!(matches!(make().concat(cleaned(), 0), Err(e) if e.is_cleaned()));
}
