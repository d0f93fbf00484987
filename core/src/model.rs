//! Classifiers used for fitting, prediction and feature importances.
//!
//! Models are resolved by name through `get_classifier`. Every model works
//! on `ArrayView2<f64>` matrices (one row per sample) whose column count is
//! fixed at fit time.

use crate::{
    config::parse_params,
    error::{BacktestError, BacktestResult},
    rng::ModelRng,
    types::Label,
};
use ndarray::{Array1, ArrayView1, ArrayView2, Axis};
use serde::Deserialize;

/// The contract every classifier must fulfill.
pub trait Classifier {
    fn name(&self) -> &'static str;

    fn fit(&mut self, x: ArrayView2<'_, f64>, y: &[Label]) -> BacktestResult<()>;

    fn predict(&self, x: ArrayView2<'_, f64>) -> BacktestResult<Vec<Label>>;

    /// One non-negative score per feature column, summing to 1 (or all
    /// zero when no feature carries signal).
    fn feature_importances(&self) -> BacktestResult<Vec<f64>>;
}

/// Resolve a classifier by configuration name.
pub fn get_classifier(name: &str, params: &serde_json::Value) -> BacktestResult<Box<dyn Classifier>> {
    let model: Box<dyn Classifier> = match name {
        RandomForest::NAME => Box::new(RandomForest::new(parse_params(name, params)?)),
        RandomForest::TREE_NAME => Box::new(RandomForest::single_tree(parse_params(name, params)?)),
        LogisticRegression::NAME => Box::new(LogisticRegression::new(parse_params(name, params)?)),
        _ => {
            return Err(BacktestError::UnknownModel {
                name: name.to_string(),
            })
        }
    };
    Ok(model)
}

/// Shape checks shared by every `fit`. Returns the feature width.
fn check_training(x: &ArrayView2<'_, f64>, y: &[Label]) -> BacktestResult<usize> {
    if x.nrows() == 0 {
        return Err(BacktestError::EmptyTrainingSet);
    }
    if x.nrows() != y.len() {
        return Err(BacktestError::LengthMismatch {
            features: x.nrows(),
            labels: y.len(),
        });
    }
    Ok(x.ncols())
}

fn check_width(x: &ArrayView2<'_, f64>, width: usize) -> BacktestResult<()> {
    if x.ncols() != width {
        return Err(BacktestError::DimensionMismatch {
            expected: width,
            actual: x.ncols(),
        });
    }
    Ok(())
}

fn normalise(mut scores: Vec<f64>) -> Vec<f64> {
    let total: f64 = scores.iter().sum();
    if total > 0.0 {
        for s in &mut scores {
            *s /= total;
        }
    }
    scores
}

// ── Random forest ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ForestParams {
    pub n_estimators:      usize,
    pub max_depth:         Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf:  usize,
    /// Features tried per split. `None` means sqrt(width).
    pub max_features:      Option<usize>,
    pub bootstrap:         bool,
    pub seed:              u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators:      100,
            max_depth:         None,
            min_samples_split: 2,
            min_samples_leaf:  1,
            max_features:      None,
            bootstrap:         true,
            seed:              0,
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        overdue_share: f64,
    },
    Split {
        feature:   usize,
        threshold: f64,
        left:      Box<Node>,
        right:     Box<Node>,
    },
}

impl Node {
    fn overdue_share(&self, row: ArrayView1<'_, f64>) -> f64 {
        let mut node = self;
        loop {
            match node {
                Node::Leaf { overdue_share } => return *overdue_share,
                Node::Split { feature, threshold, left, right } => {
                    node = if row[*feature] <= *threshold { left } else { right };
                }
            }
        }
    }
}

struct SplitChoice {
    feature:   usize,
    threshold: f64,
    gain:      f64,
}

/// Bagged CART trees with Gini impurity. Importances are the normalised
/// total impurity decrease per feature, averaged over trees.
pub struct RandomForest {
    name:        &'static str,
    params:      ForestParams,
    trees:       Vec<Node>,
    importances: Vec<f64>,
    width:       Option<usize>,
}

impl RandomForest {
    pub const NAME: &'static str = "random_forest";
    pub const TREE_NAME: &'static str = "decision_tree";

    pub fn new(params: ForestParams) -> Self {
        Self {
            name: Self::NAME,
            params,
            trees: Vec::new(),
            importances: Vec::new(),
            width: None,
        }
    }

    /// One unbagged tree that considers every feature at every split.
    pub fn single_tree(params: ForestParams) -> Self {
        let params = ForestParams {
            n_estimators: 1,
            bootstrap: false,
            max_features: None,
            ..params
        };
        Self {
            name: Self::TREE_NAME,
            ..Self::new(params)
        }
    }

    fn features_per_split(&self, width: usize) -> usize {
        if self.name == Self::TREE_NAME {
            return width;
        }
        let k = self
            .params
            .max_features
            .unwrap_or_else(|| (width as f64).sqrt().round() as usize);
        k.clamp(1, width.max(1))
    }

    #[allow(clippy::too_many_arguments)]
    fn grow(
        &self,
        x: &ArrayView2<'_, f64>,
        y: &[Label],
        rows: Vec<usize>,
        depth: usize,
        per_split: usize,
        rng: &mut ModelRng,
        importances: &mut [f64],
    ) -> Node {
        let positives = rows.iter().filter(|&&r| y[r] == Label::Overdue).count();
        let overdue_share = positives as f64 / rows.len().max(1) as f64;

        let depth_reached = self.params.max_depth.is_some_and(|max| depth >= max);
        let pure = positives == 0 || positives == rows.len();
        if depth_reached || pure || rows.len() < self.params.min_samples_split.max(2) {
            return Node::Leaf { overdue_share };
        }

        let width = importances.len();
        let order = if per_split >= width {
            (0..width).collect()
        } else {
            rng.choose_distinct(width, width)
        };

        let Some(choice) = best_split(x, y, &rows, &order, per_split, self.params.min_samples_leaf.max(1)) else {
            return Node::Leaf { overdue_share };
        };
        importances[choice.feature] += choice.gain;

        let (left, right): (Vec<usize>, Vec<usize>) = rows
            .into_iter()
            .partition(|&r| x[[r, choice.feature]] <= choice.threshold);

        Node::Split {
            feature:   choice.feature,
            threshold: choice.threshold,
            left:      Box::new(self.grow(x, y, left, depth + 1, per_split, rng, importances)),
            right:     Box::new(self.grow(x, y, right, depth + 1, per_split, rng, importances)),
        }
    }
}

fn gini(positives: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let p = positives as f64 / total as f64;
    2.0 * p * (1.0 - p)
}

/// Scan features in `order`. The first `per_split` are always tried; past
/// that, scanning continues only until some feature yields a split.
fn best_split(
    x: &ArrayView2<'_, f64>,
    y: &[Label],
    rows: &[usize],
    order: &[usize],
    per_split: usize,
    min_leaf: usize,
) -> Option<SplitChoice> {
    let total = rows.len();
    let total_pos = rows.iter().filter(|&&r| y[r] == Label::Overdue).count();
    let parent = total as f64 * gini(total_pos, total);

    let mut best: Option<SplitChoice> = None;
    for (tried, &feature) in order.iter().enumerate() {
        if tried >= per_split && best.is_some() {
            break;
        }
        let mut sorted = rows.to_vec();
        sorted.sort_by(|&a, &b| x[[a, feature]].total_cmp(&x[[b, feature]]));

        let mut left_pos = 0;
        for i in 0..total - 1 {
            if y[sorted[i]] == Label::Overdue {
                left_pos += 1;
            }
            let n_left = i + 1;
            let n_right = total - n_left;
            let here = x[[sorted[i], feature]];
            let next = x[[sorted[i + 1], feature]];
            if here == next || n_left < min_leaf || n_right < min_leaf {
                continue;
            }
            let weighted = n_left as f64 * gini(left_pos, n_left)
                + n_right as f64 * gini(total_pos - left_pos, n_right);
            let gain = parent - weighted;
            if gain > 1e-12 && best.as_ref().map_or(true, |b| gain > b.gain) {
                best = Some(SplitChoice {
                    feature,
                    threshold: (here + next) / 2.0,
                    gain,
                });
            }
        }
    }
    best
}

impl Classifier for RandomForest {
    fn name(&self) -> &'static str {
        self.name
    }

    fn fit(&mut self, x: ArrayView2<'_, f64>, y: &[Label]) -> BacktestResult<()> {
        let width = check_training(&x, y)?;
        let n_rows = x.nrows();
        let per_split = self.features_per_split(width);
        let n_trees = self.params.n_estimators.max(1);

        let mut trees = Vec::with_capacity(n_trees);
        let mut summed = vec![0.0; width];
        for tree_index in 0..n_trees {
            let mut rng = ModelRng::new(self.params.seed, tree_index as u64);
            let rows = if self.params.bootstrap {
                rng.bootstrap(n_rows, n_rows)
            } else {
                (0..n_rows).collect()
            };
            let mut importances = vec![0.0; width];
            trees.push(self.grow(&x, y, rows, 0, per_split, &mut rng, &mut importances));
            for (sum, imp) in summed.iter_mut().zip(normalise(importances)) {
                *sum += imp;
            }
        }

        self.trees = trees;
        self.importances = normalise(summed);
        self.width = Some(width);
        log::debug!("{}: fitted {n_trees} trees on {n_rows} rows", self.name);
        Ok(())
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> BacktestResult<Vec<Label>> {
        let width = self.width.ok_or_else(|| BacktestError::NotFitted {
            name: self.name.to_string(),
        })?;
        check_width(&x, width)?;
        let n_trees = self.trees.len() as f64;
        Ok(x
            .rows()
            .into_iter()
            .map(|row| {
                let share: f64 = self.trees.iter().map(|t| t.overdue_share(row.view())).sum::<f64>() / n_trees;
                Label::from_f64(share)
            })
            .collect())
    }

    fn feature_importances(&self) -> BacktestResult<Vec<f64>> {
        if self.width.is_none() {
            return Err(BacktestError::NotFitted {
                name: self.name.to_string(),
            });
        }
        Ok(self.importances.clone())
    }
}

// ── Logistic regression ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogisticParams {
    pub learning_rate: f64,
    pub epochs:        usize,
    pub l2:            f64,
}

impl Default for LogisticParams {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            epochs:        500,
            l2:            0.0,
        }
    }
}

/// Batch gradient descent on standardised features. Importances are the
/// normalised absolute coefficients.
pub struct LogisticRegression {
    params:  LogisticParams,
    fitted:  Option<LogisticState>,
}

struct LogisticState {
    means:   Array1<f64>,
    scales:  Array1<f64>,
    weights: Array1<f64>,
    bias:    f64,
}

impl LogisticState {
    fn probabilities(&self, x: &ArrayView2<'_, f64>) -> Array1<f64> {
        let z = (x - &self.means) / &self.scales;
        (z.dot(&self.weights) + self.bias).mapv(sigmoid)
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

impl LogisticRegression {
    pub const NAME: &'static str = "logistic_regression";

    pub fn new(params: LogisticParams) -> Self {
        Self { params, fitted: None }
    }
}

impl Classifier for LogisticRegression {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn fit(&mut self, x: ArrayView2<'_, f64>, y: &[Label]) -> BacktestResult<()> {
        let width = check_training(&x, y)?;
        let n = x.nrows() as f64;

        let means = x
            .mean_axis(Axis(0))
            .ok_or(BacktestError::EmptyTrainingSet)?;
        let scales = x
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s > 0.0 { s } else { 1.0 });
        let z = (&x - &means) / &scales;
        let targets: Array1<f64> = y.iter().map(|l| l.as_f64()).collect();

        let mut weights: Array1<f64> = Array1::zeros(width);
        let mut bias = 0.0;
        for _ in 0..self.params.epochs {
            let err = (z.dot(&weights) + bias).mapv(sigmoid) - &targets;
            let grad_w = z.t().dot(&err) / n + &weights * self.params.l2;
            weights.scaled_add(-self.params.learning_rate, &grad_w);
            bias -= self.params.learning_rate * err.sum() / n;
        }

        self.fitted = Some(LogisticState {
            means,
            scales,
            weights,
            bias,
        });
        Ok(())
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> BacktestResult<Vec<Label>> {
        let state = self.fitted.as_ref().ok_or_else(|| BacktestError::NotFitted {
            name: Self::NAME.to_string(),
        })?;
        check_width(&x, state.weights.len())?;
        Ok(state.probabilities(&x).iter().map(|&p| Label::from_f64(p)).collect())
    }

    fn feature_importances(&self) -> BacktestResult<Vec<f64>> {
        let state = self.fitted.as_ref().ok_or_else(|| BacktestError::NotFitted {
            name: Self::NAME.to_string(),
        })?;
        Ok(normalise(state.weights.mapv(f64::abs).to_vec()))
    }
}
