use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Hyper-parameters for [`RandomForest`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub max_depth: usize,
    /// Nodes with fewer samples than this become leaves.
    pub min_samples_split: usize,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: 20,
            min_samples_split: 2,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Leaf {
        /// Class frequencies at this leaf, summing to 1.
        distribution: Vec<f64>,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// CART classification tree stored as a flat node list rooted at index 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<Node>,
}

impl DecisionTree {
    fn predict_distribution(&self, row: &[f64]) -> &[f64] {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { distribution } => return distribution,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn validate(&self, n_features: usize, n_classes: usize) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".into());
        }
        for (idx, node) in self.nodes.iter().enumerate() {
            match node {
                Node::Leaf { distribution } => {
                    if distribution.len() != n_classes {
                        return Err(format!(
                            "leaf {} has {} classes, expected {}",
                            idx,
                            distribution.len(),
                            n_classes
                        ));
                    }
                }
                Node::Split {
                    feature,
                    left,
                    right,
                    ..
                } => {
                    // children are always appended after their parent
                    if *feature >= n_features
                        || *left <= idx
                        || *right <= idx
                        || *left >= self.nodes.len()
                        || *right >= self.nodes.len()
                    {
                        return Err(format!("split node {} is malformed", idx));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Bagged ensemble of Gini-impurity decision trees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    params: ForestParams,
    n_features: usize,
    n_classes: usize,
    trees: Vec<DecisionTree>,
}

impl RandomForest {
    /// Grow `params.n_estimators` trees on bootstrap resamples of `(x, y)`.
    ///
    /// `y` holds class indices below `n_classes`; `x` is non-empty and
    /// rectangular. Per-tree seeds are drawn before any tree is grown, so the
    /// result does not depend on how rayon spreads trees across workers.
    pub fn fit(x: &[Vec<f64>], y: &[usize], n_classes: usize, params: ForestParams) -> Self {
        let n_features = x.first().map(Vec::len).unwrap_or(0);
        let mut master = StdRng::seed_from_u64(params.seed);
        let seeds: Vec<u64> = (0..params.n_estimators.max(1)).map(|_| master.gen()).collect();

        let trees: Vec<DecisionTree> = seeds
            .par_iter()
            .map(|&seed| grow_tree(x, y, n_classes, &params, seed))
            .collect();

        Self {
            params,
            n_features,
            n_classes,
            trees,
        }
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    pub fn params(&self) -> &ForestParams {
        &self.params
    }

    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }

    /// Mean of the per-tree leaf distributions. `row` must have `n_features` values.
    pub fn predict_proba_row(&self, row: &[f64]) -> Vec<f64> {
        let mut acc = vec![0.0; self.n_classes];
        for tree in &self.trees {
            for (a, p) in acc.iter_mut().zip(tree.predict_distribution(row)) {
                *a += p;
            }
        }
        let n = self.trees.len().max(1) as f64;
        acc.iter_mut().for_each(|a| *a /= n);
        acc
    }

    /// Structural checks for a deserialized forest.
    pub fn validate(&self) -> Result<(), String> {
        if self.trees.is_empty() {
            return Err("forest has no trees".into());
        }
        if self.n_classes == 0 {
            return Err("forest has no classes".into());
        }
        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate(self.n_features, self.n_classes)
                .map_err(|e| format!("tree {}: {}", i, e))?;
        }
        Ok(())
    }
}

/// Index of the first maximal probability.
pub fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if *v > values[best] {
            best = i;
        }
    }
    best
}

fn grow_tree(
    x: &[Vec<f64>],
    y: &[usize],
    n_classes: usize,
    params: &ForestParams,
    seed: u64,
) -> DecisionTree {
    let mut rng = StdRng::seed_from_u64(seed);
    let n = x.len();
    let mut indices: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
    let n_features = x.first().map(Vec::len).unwrap_or(0);
    let max_features = ((n_features as f64).sqrt() as usize).max(1);
    let mut builder = TreeBuilder {
        x,
        y,
        n_classes,
        max_depth: params.max_depth,
        min_samples_split: params.min_samples_split.max(2),
        max_features,
        rng,
        nodes: Vec::new(),
    };
    builder.build(&mut indices, 0);
    DecisionTree {
        nodes: builder.nodes,
    }
}

struct TreeBuilder<'a> {
    x: &'a [Vec<f64>],
    y: &'a [usize],
    n_classes: usize,
    max_depth: usize,
    min_samples_split: usize,
    max_features: usize,
    rng: StdRng,
    nodes: Vec<Node>,
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    /// Sum over both children of `sum(count^2) / child_size`; larger is purer.
    score: f64,
}

impl TreeBuilder<'_> {
    fn build(&mut self, indices: &mut [usize], depth: usize) -> usize {
        let counts = self.class_counts(indices);
        let node_id = self.nodes.len();
        self.nodes.push(leaf(&counts, indices.len()));

        let pure = counts.iter().filter(|&&c| c > 0).count() <= 1;
        if pure || depth >= self.max_depth || indices.len() < self.min_samples_split {
            return node_id;
        }
        let Some(split) = self.best_split(indices) else {
            return node_id;
        };

        let mid = partition(indices, |i| self.x[i][split.feature] <= split.threshold);
        let (left_idx, right_idx) = indices.split_at_mut(mid);
        let left = self.build(left_idx, depth + 1);
        let right = self.build(right_idx, depth + 1);
        self.nodes[node_id] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        node_id
    }

    fn class_counts(&self, indices: &[usize]) -> Vec<usize> {
        let mut counts = vec![0; self.n_classes];
        for &i in indices {
            counts[self.y[i]] += 1;
        }
        counts
    }

    /// Examine at least `max_features` randomly ordered features, continuing
    /// past that only while no valid split has been found.
    fn best_split(&mut self, indices: &[usize]) -> Option<SplitCandidate> {
        let n_features = self.x[indices[0]].len();
        let mut features: Vec<usize> = (0..n_features).collect();
        features.shuffle(&mut self.rng);

        let mut best: Option<SplitCandidate> = None;
        for (visited, &feature) in features.iter().enumerate() {
            if visited >= self.max_features && best.is_some() {
                break;
            }
            if let Some(candidate) = self.best_split_on(indices, feature) {
                if best.as_ref().map_or(true, |b| candidate.score > b.score) {
                    best = Some(candidate);
                }
            }
        }
        best
    }

    fn best_split_on(&self, indices: &[usize], feature: usize) -> Option<SplitCandidate> {
        let mut pairs: Vec<(f64, usize)> = indices
            .iter()
            .map(|&i| (self.x[i][feature], self.y[i]))
            .collect();
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

        let n = pairs.len();
        let mut left = vec![0usize; self.n_classes];
        let mut right = vec![0usize; self.n_classes];
        for &(_, class) in &pairs {
            right[class] += 1;
        }
        let mut left_sq: f64 = 0.0;
        let mut right_sq: f64 = right.iter().map(|&c| (c * c) as f64).sum();

        let mut best: Option<SplitCandidate> = None;
        for i in 1..n {
            let (prev_value, class) = pairs[i - 1];
            // move sample i-1 from right to left, updating the squared sums
            left_sq += (2 * left[class] + 1) as f64;
            left[class] += 1;
            right_sq -= (2 * right[class] - 1) as f64;
            right[class] -= 1;

            let value = pairs[i].0;
            if value <= prev_value {
                continue;
            }
            let score = left_sq / i as f64 + right_sq / (n - i) as f64;
            if best.as_ref().map_or(true, |b| score > b.score) {
                let mut threshold = prev_value + (value - prev_value) / 2.0;
                if threshold >= value {
                    threshold = prev_value;
                }
                best = Some(SplitCandidate {
                    feature,
                    threshold,
                    score,
                });
            }
        }
        best
    }
}

fn leaf(counts: &[usize], total: usize) -> Node {
    let total = total.max(1) as f64;
    Node::Leaf {
        distribution: counts.iter().map(|&c| c as f64 / total).collect(),
    }
}

/// Reorder `indices` so entries satisfying `pred` come first; returns their count.
fn partition(indices: &mut [usize], pred: impl Fn(usize) -> bool) -> usize {
    let mut mid = 0;
    for i in 0..indices.len() {
        if pred(indices[i]) {
            indices.swap(i, mid);
            mid += 1;
        }
    }
    mid
}
