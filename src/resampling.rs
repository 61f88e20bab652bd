//! Resampling
//!
//! Repeated K-fold sample splitting for cross-fitting. Every repetition is a
//! partition of the observation indices into `n_folds` test sets; each fold's
//! training set is the complement of its test set.
use crate::errors::DoubleMLError;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One train/test pair of observation indices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fold {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

impl Fold {
    fn from_test(mut test: Vec<usize>, n_obs: usize) -> Self {
        test.sort_unstable();
        let mut in_test = vec![false; n_obs];
        for i in &test {
            in_test[*i] = true;
        }
        let train = (0..n_obs).filter(|i| !in_test[*i]).collect();
        Fold { train, test }
    }
}

/// A strategy that partitions `n_obs` indices into folds.
pub trait Resampler {
    /// Draw one partition into folds.
    fn split(&self, rng: &mut StdRng, n_obs: usize) -> Vec<Fold>;
}

/// Sizes of `n_folds` contiguous chunks of `n` items, larger chunks first.
fn fold_sizes(n: usize, n_folds: usize) -> Vec<usize> {
    (0..n_folds)
        .map(|k| n / n_folds + usize::from(k < n % n_folds))
        .collect()
}

/// Shuffled K-fold.
pub struct KFold {
    pub n_folds: usize,
}

impl Resampler for KFold {
    fn split(&self, rng: &mut StdRng, n_obs: usize) -> Vec<Fold> {
        let mut index: Vec<usize> = (0..n_obs).collect();
        index.shuffle(rng);
        let mut folds = Vec::with_capacity(self.n_folds);
        let mut start = 0;
        for size in fold_sizes(n_obs, self.n_folds) {
            folds.push(Fold::from_test(index[start..start + size].to_vec(), n_obs));
            start += size;
        }
        folds
    }
}

/// K-fold that keeps the share of every group roughly equal across folds.
///
/// Observations are shuffled within their group, laid out group after group,
/// and dealt to the folds in turn.
pub struct StratifiedKFold {
    pub n_folds: usize,
    pub groups: Vec<i64>,
}

impl Resampler for StratifiedKFold {
    fn split(&self, rng: &mut StdRng, n_obs: usize) -> Vec<Fold> {
        let mut by_group: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
        for (i, g) in self.groups.iter().enumerate().take(n_obs) {
            by_group.entry(*g).or_default().push(i);
        }
        let mut tests: Vec<Vec<usize>> = vec![Vec::new(); self.n_folds];
        let mut position = 0;
        for members in by_group.values_mut() {
            members.shuffle(rng);
            for i in members.iter() {
                tests[position % self.n_folds].push(*i);
                position += 1;
            }
        }
        tests.into_iter().map(|t| Fold::from_test(t, n_obs)).collect()
    }
}

/// K-fold over clusters: all observations of a cluster share a test fold.
pub struct ClusterKFold {
    pub n_folds: usize,
    pub clusters: Vec<i64>,
}

impl ClusterKFold {
    fn unique_clusters(&self) -> Vec<i64> {
        let mut unique = self.clusters.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }
}

impl Resampler for ClusterKFold {
    fn split(&self, rng: &mut StdRng, n_obs: usize) -> Vec<Fold> {
        let mut unique = self.unique_clusters();
        unique.shuffle(rng);
        let mut assignment = BTreeMap::new();
        let mut start = 0;
        for (k, size) in fold_sizes(unique.len(), self.n_folds).into_iter().enumerate() {
            for c in &unique[start..start + size] {
                assignment.insert(*c, k);
            }
            start += size;
        }
        let mut tests: Vec<Vec<usize>> = vec![Vec::new(); self.n_folds];
        for (i, c) in self.clusters.iter().enumerate().take(n_obs) {
            tests[assignment[c]].push(i);
        }
        tests.into_iter().map(|t| Fold::from_test(t, n_obs)).collect()
    }
}

/// Unshuffled K-fold over `n` positions: test sets are contiguous blocks.
pub fn kfold_contiguous(n: usize, n_folds: usize) -> Vec<Fold> {
    let mut folds = Vec::with_capacity(n_folds);
    let mut start = 0;
    for size in fold_sizes(n, n_folds) {
        folds.push(Fold::from_test((start..start + size).collect(), n));
        start += size;
    }
    folds
}

/// Shuffle `index` with a dedicated seed and split it into two parts, the
/// second holding `ceil(test_size * len)` entries.
pub fn train_test_split(index: &[usize], test_size: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut shuffled = index.to_vec();
    shuffled.shuffle(&mut rng);
    let n_test = (test_size * index.len() as f64).ceil() as usize;
    let n_train = index.len() - n_test.min(index.len());
    let test = shuffled.split_off(n_train);
    (shuffled, test)
}

/// Check that `folds` partition `0..n_obs`: every index is in exactly one
/// test set and no fold's train and test sets intersect.
pub fn validate_partition(folds: &[Fold], n_obs: usize) -> Result<(), DoubleMLError> {
    let mut seen = vec![0usize; n_obs];
    for (k, fold) in folds.iter().enumerate() {
        if fold.test.is_empty() || fold.train.is_empty() {
            return Err(DoubleMLError::invalid(
                "sample splitting",
                "non-empty train and test sets",
                format!("an empty set in fold {}", k),
            ));
        }
        let mut in_test = vec![false; n_obs];
        for i in &fold.test {
            if *i >= n_obs {
                return Err(DoubleMLError::invalid(
                    "sample splitting",
                    format!("indices below {}", n_obs),
                    i,
                ));
            }
            in_test[*i] = true;
            seen[*i] += 1;
        }
        if let Some(i) = fold.train.iter().find(|i| **i >= n_obs || in_test[**i]) {
            return Err(DoubleMLError::invalid(
                "sample splitting",
                "disjoint train and test sets",
                format!("index {} in the train set of fold {}", i, k),
            ));
        }
    }
    if let Some(i) = seen.iter().position(|c| *c != 1) {
        return Err(DoubleMLError::invalid(
            "sample splitting",
            "every observation in exactly one test set",
            format!("observation {} in {} test sets", i, seen[i]),
        ));
    }
    Ok(())
}

/// Grouping applied when drawing folds.
#[derive(Debug, Clone, PartialEq)]
pub enum Grouping {
    None,
    Stratified(Vec<i64>),
    Clustered(Vec<i64>),
}

/// Serialized form of [`SampleSplitting`], checked on the way in.
#[derive(Deserialize)]
struct RawSampleSplitting {
    n_obs: usize,
    folds: Vec<Vec<Fold>>,
}

impl TryFrom<RawSampleSplitting> for SampleSplitting {
    type Error = DoubleMLError;

    fn try_from(raw: RawSampleSplitting) -> Result<Self, Self::Error> {
        SampleSplitting::new(raw.folds, raw.n_obs)
    }
}

/// Repeated cross-fitting partitions, indexed `[repetition][fold]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSampleSplitting")]
pub struct SampleSplitting {
    n_obs: usize,
    folds: Vec<Vec<Fold>>,
}

impl SampleSplitting {
    /// Wrap an externally drawn splitting after checking that every
    /// repetition partitions `0..n_obs` into the same number of folds.
    pub fn new(folds: Vec<Vec<Fold>>, n_obs: usize) -> Result<Self, DoubleMLError> {
        let splitting = SampleSplitting { n_obs, folds };
        splitting.validate()?;
        Ok(splitting)
    }

    /// Check every repetition against `0..n_obs`.
    pub fn validate(&self) -> Result<(), DoubleMLError> {
        let n_folds = self.n_folds();
        if self.folds.is_empty() || n_folds < 2 {
            return Err(DoubleMLError::invalid(
                "sample splitting",
                "at least one repetition with two or more folds",
                format!("{} repetitions of {} folds", self.folds.len(), n_folds),
            ));
        }
        for (r, rep) in self.folds.iter().enumerate() {
            if rep.len() != n_folds {
                return Err(DoubleMLError::invalid(
                    "sample splitting",
                    format!("{} folds in every repetition", n_folds),
                    format!("{} folds in repetition {}", rep.len(), r),
                ));
            }
            validate_partition(rep, self.n_obs)?;
        }
        Ok(())
    }

    pub fn n_obs(&self) -> usize {
        self.n_obs
    }

    pub fn n_rep(&self) -> usize {
        self.folds.len()
    }

    /// Folds per repetition, `0` for an empty splitting.
    pub fn n_folds(&self) -> usize {
        self.folds.first().map_or(0, |f| f.len())
    }

    /// Folds of repetition `rep`.
    pub fn rep(&self, rep: usize) -> &[Fold] {
        &self.folds[rep]
    }

    pub fn iter(&self) -> impl Iterator<Item = &[Fold]> {
        self.folds.iter().map(|f| f.as_slice())
    }
}

/// Draws `n_rep` independent K-fold partitions.
#[derive(Debug, Clone)]
pub struct DoubleMLResampling {
    n_folds: usize,
    n_rep: usize,
    n_obs: usize,
    grouping: Grouping,
}

impl DoubleMLResampling {
    /// * `n_folds` - Number of folds, at least 2 and at most `n_obs`.
    /// * `n_rep` - Number of repetitions, at least 1.
    /// * `n_obs` - Number of observations.
    pub fn new(n_folds: usize, n_rep: usize, n_obs: usize) -> Result<Self, DoubleMLError> {
        if n_folds < 2 {
            return Err(DoubleMLError::invalid("n_folds", "an integer of at least 2", n_folds));
        }
        if n_rep < 1 {
            return Err(DoubleMLError::invalid("n_rep", "an integer of at least 1", n_rep));
        }
        if n_obs < n_folds {
            return Err(DoubleMLError::invalid(
                "n_folds",
                format!("at most the number of observations ({})", n_obs),
                n_folds,
            ));
        }
        Ok(DoubleMLResampling {
            n_folds,
            n_rep,
            n_obs,
            grouping: Grouping::None,
        })
    }

    /// Stratify folds by `groups` (one label per observation).
    pub fn stratify(mut self, groups: Vec<i64>) -> Result<Self, DoubleMLError> {
        if groups.len() != self.n_obs {
            return Err(DoubleMLError::invalid(
                "groups",
                format!("{} labels", self.n_obs),
                groups.len(),
            ));
        }
        self.grouping = Grouping::Stratified(groups);
        Ok(self)
    }

    /// Keep every cluster inside a single test fold.
    pub fn cluster(mut self, clusters: Vec<i64>) -> Result<Self, DoubleMLError> {
        if clusters.len() != self.n_obs {
            return Err(DoubleMLError::invalid(
                "clusters",
                format!("{} labels", self.n_obs),
                clusters.len(),
            ));
        }
        let mut unique = clusters.clone();
        unique.sort_unstable();
        unique.dedup();
        if unique.len() < self.n_folds {
            return Err(DoubleMLError::invalid(
                "n_folds",
                format!("at most the number of clusters ({})", unique.len()),
                self.n_folds,
            ));
        }
        self.grouping = Grouping::Clustered(clusters);
        Ok(self)
    }

    /// Draw all repetitions from `rng`.
    pub fn split(&self, rng: &mut StdRng) -> SampleSplitting {
        let resampler: Box<dyn Resampler> = match &self.grouping {
            Grouping::None => Box::new(KFold { n_folds: self.n_folds }),
            Grouping::Stratified(groups) => Box::new(StratifiedKFold {
                n_folds: self.n_folds,
                groups: groups.clone(),
            }),
            Grouping::Clustered(clusters) => Box::new(ClusterKFold {
                n_folds: self.n_folds,
                clusters: clusters.clone(),
            }),
        };
        let folds = (0..self.n_rep).map(|_| resampler.split(rng, self.n_obs)).collect();
        SampleSplitting {
            n_obs: self.n_obs,
            folds,
        }
    }
}
