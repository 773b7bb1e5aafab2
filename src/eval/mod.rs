//! Threshold tuning and evaluation against held-out labeled data.
//!
//! Ground truth uses the +1/-1 convention with the anomalous class (-1)
//! as the positive class of every curve and threshold metric. Detector
//! scores arrive in the shared lower-is-anomalous convention and are
//! negated before the precision-recall sweep, so the swept statistic is
//! higher = more confident anomaly for every family.

use crate::detector::Detector;
use crate::error::{LogSentinelError, Result};
use crate::preprocessing::FeatureMatrix;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Epsilon guarding the F1 denominator when precision and recall are both
/// zero
const F1_EPSILON: f64 = 1e-6;

/// Binary confusion matrix with anomaly (-1) as the positive class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub true_positives: usize,
    pub false_positives: usize,
    pub true_negatives: usize,
    pub false_negatives: usize,
}

impl ConfusionMatrix {
    pub fn from_labels(y_true: &Array1<i32>, y_pred: &Array1<i32>) -> Self {
        let mut cm = Self {
            true_positives: 0,
            false_positives: 0,
            true_negatives: 0,
            false_negatives: 0,
        };
        for (&t, &p) in y_true.iter().zip(y_pred.iter()) {
            match (t == -1, p == -1) {
                (true, true) => cm.true_positives += 1,
                (false, true) => cm.false_positives += 1,
                (false, false) => cm.true_negatives += 1,
                (true, false) => cm.false_negatives += 1,
            }
        }
        cm
    }

    pub fn precision(&self) -> f64 {
        let denom = self.true_positives + self.false_positives;
        if denom == 0 {
            0.0
        } else {
            self.true_positives as f64 / denom as f64
        }
    }

    pub fn recall(&self) -> f64 {
        let denom = self.true_positives + self.false_negatives;
        if denom == 0 {
            0.0
        } else {
            self.true_positives as f64 / denom as f64
        }
    }

    pub fn f1(&self) -> f64 {
        let p = self.precision();
        let r = self.recall();
        if p + r == 0.0 {
            0.0
        } else {
            2.0 * p * r / (p + r)
        }
    }

    pub fn false_positive_rate(&self) -> f64 {
        let denom = self.false_positives + self.true_negatives;
        if denom == 0 {
            0.0
        } else {
            self.false_positives as f64 / denom as f64
        }
    }

    pub fn matthews_correlation(&self) -> f64 {
        let tp = self.true_positives as f64;
        let fp = self.false_positives as f64;
        let tn = self.true_negatives as f64;
        let fn_ = self.false_negatives as f64;
        let denom = ((tp + fp) * (tp + fn_) * (tn + fp) * (tn + fn_)).sqrt();
        if denom == 0.0 {
            0.0
        } else {
            (tp * tn - fp * fn_) / denom
        }
    }
}

/// Precision-recall curve over a statistic where higher = more confident
/// anomaly. Thresholds ascend; recall is non-increasing along the arrays,
/// and the final (precision=1, recall=0) point carries no threshold.
#[derive(Debug, Clone)]
pub struct PrCurve {
    pub precision: Vec<f64>,
    pub recall: Vec<f64>,
    pub thresholds: Vec<f64>,
}

/// Sweep the precision-recall curve of `stat` against `y_true`
/// (anomaly = -1 = positive).
pub fn precision_recall_curve(y_true: &Array1<i32>, stat: &Array1<f64>) -> PrCurve {
    let n = y_true.len();
    let total_pos = y_true.iter().filter(|&&t| t == -1).count();

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        stat[b]
            .partial_cmp(&stat[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut precision = Vec::new();
    let mut recall = Vec::new();
    let mut thresholds = Vec::new();

    let mut tp = 0usize;
    let mut fp = 0usize;
    for (k, &idx) in order.iter().enumerate() {
        if y_true[idx] == -1 {
            tp += 1;
        } else {
            fp += 1;
        }
        // Record only at distinct-value boundaries
        let next_differs = k + 1 >= n || stat[order[k + 1]] != stat[idx];
        if next_differs {
            thresholds.push(stat[idx]);
            precision.push(tp as f64 / (tp + fp) as f64);
            recall.push(if total_pos > 0 {
                tp as f64 / total_pos as f64
            } else {
                0.0
            });
        }
    }

    // Ascending thresholds, non-increasing recall, then the (1, 0) endpoint
    precision.reverse();
    recall.reverse();
    thresholds.reverse();
    precision.push(1.0);
    recall.push(0.0);

    PrCurve {
        precision,
        recall,
        thresholds,
    }
}

/// Area under the ROC curve of `stat` (higher = anomaly), computed by
/// rank statistics with average ranks for ties. Returns 0.5 when either
/// class is absent.
pub fn roc_auc(y_true: &Array1<i32>, stat: &Array1<f64>) -> f64 {
    let n = y_true.len();
    let n_pos = y_true.iter().filter(|&&t| t == -1).count();
    let n_neg = n - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return 0.5;
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        stat[a]
            .partial_cmp(&stat[b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    // Average ranks over tie groups
    let mut ranks = vec![0.0f64; n];
    let mut k = 0;
    while k < n {
        let mut j = k;
        while j + 1 < n && stat[order[j + 1]] == stat[order[k]] {
            j += 1;
        }
        let avg_rank = (k + j + 2) as f64 / 2.0; // ranks are 1-based
        for &idx in &order[k..=j] {
            ranks[idx] = avg_rank;
        }
        k = j + 1;
    }

    let rank_sum: f64 = y_true
        .iter()
        .zip(ranks.iter())
        .filter(|(&t, _)| t == -1)
        .map(|(_, &r)| r)
        .sum();

    (rank_sum - (n_pos * (n_pos + 1)) as f64 / 2.0) / (n_pos * n_neg) as f64
}

/// Average precision (PR-AUC) of `stat` (higher = anomaly)
pub fn average_precision(y_true: &Array1<i32>, stat: &Array1<f64>) -> f64 {
    let n = y_true.len();
    let total_pos = y_true.iter().filter(|&&t| t == -1).count();
    if total_pos == 0 {
        return 0.0;
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        stat[b]
            .partial_cmp(&stat[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut tp = 0usize;
    let mut fp = 0usize;
    let mut prev_recall = 0.0;
    let mut ap = 0.0;
    for (k, &idx) in order.iter().enumerate() {
        if y_true[idx] == -1 {
            tp += 1;
        } else {
            fp += 1;
        }
        let next_differs = k + 1 >= n || stat[order[k + 1]] != stat[idx];
        if next_differs {
            let precision = tp as f64 / (tp + fp) as f64;
            let recall = tp as f64 / total_pos as f64;
            ap += (recall - prev_recall) * precision;
            prev_recall = recall;
        }
    }
    ap
}

/// Mean silhouette coefficient restricted to points assigned to a real
/// cluster (noise excluded). `None` when fewer than 2 points are
/// clustered or fewer than 2 clusters exist.
pub fn silhouette(x: &Array2<f64>, cluster_labels: &[i64]) -> Option<f64> {
    let clustered: Vec<usize> = cluster_labels
        .iter()
        .enumerate()
        .filter(|(_, &l)| l >= 0)
        .map(|(i, _)| i)
        .collect();
    if clustered.len() < 2 {
        return None;
    }

    let mut clusters: Vec<i64> = clustered.iter().map(|&i| cluster_labels[i]).collect();
    clusters.sort_unstable();
    clusters.dedup();
    if clusters.len() < 2 {
        return None;
    }

    let dist = |a: usize, b: usize| -> f64 {
        x.row(a)
            .iter()
            .zip(x.row(b).iter())
            .map(|(u, v)| (u - v).powi(2))
            .sum::<f64>()
            .sqrt()
    };

    let mut total = 0.0;
    for &i in &clustered {
        let own = cluster_labels[i];

        let mut own_sum = 0.0;
        let mut own_count = 0usize;
        let mut other: std::collections::HashMap<i64, (f64, usize)> =
            std::collections::HashMap::new();

        for &j in &clustered {
            if i == j {
                continue;
            }
            let d = dist(i, j);
            if cluster_labels[j] == own {
                own_sum += d;
                own_count += 1;
            } else {
                let entry = other.entry(cluster_labels[j]).or_insert((0.0, 0));
                entry.0 += d;
                entry.1 += 1;
            }
        }

        let s = if own_count == 0 {
            0.0
        } else {
            let a = own_sum / own_count as f64;
            let b = other
                .values()
                .map(|(sum, count)| sum / *count as f64)
                .fold(f64::INFINITY, f64::min);
            let denom = a.max(b);
            if denom == 0.0 {
                0.0
            } else {
                (b - a) / denom
            }
        };
        total += s;
    }

    Some(total / clustered.len() as f64)
}

/// Metrics bundle for one evaluation run. Derived, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub confusion: ConfusionMatrix,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub false_positive_rate: f64,
    pub matthews_correlation: f64,
    /// Discrimination ability, independent of the chosen threshold
    pub roc_auc: f64,
    pub pr_auc: f64,
    /// Threshold on the negated score selected by the F1 sweep
    pub chosen_threshold: f64,
    /// False when the sweep degenerated and the zero fallback was used
    pub threshold_tuned: bool,
    /// Cluster cohesion over non-noise points (clustering family only)
    pub silhouette: Option<f64>,
}

impl EvaluationResult {
    /// Human-readable metrics summary
    pub fn report(&self) -> String {
        let mut out = String::new();
        out.push_str("=== Evaluation metrics ===\n");
        out.push_str(&format!(
            "confusion: tp={} fp={} tn={} fn={}\n",
            self.confusion.true_positives,
            self.confusion.false_positives,
            self.confusion.true_negatives,
            self.confusion.false_negatives
        ));
        out.push_str(&format!("precision: {:.4}\n", self.precision));
        out.push_str(&format!("recall   : {:.4}\n", self.recall));
        out.push_str(&format!("f1       : {:.4}\n", self.f1));
        out.push_str(&format!("fpr      : {:.4}\n", self.false_positive_rate));
        out.push_str(&format!("mcc      : {:.4}\n", self.matthews_correlation));
        out.push_str(&format!("roc-auc  : {:.4}\n", self.roc_auc));
        out.push_str(&format!("pr-auc   : {:.4}\n", self.pr_auc));
        out.push_str(&format!(
            "threshold: {:.4} ({})\n",
            self.chosen_threshold,
            if self.threshold_tuned { "tuned" } else { "untuned" }
        ));
        if let Some(s) = self.silhouette {
            out.push_str(&format!("silhouette: {s:.4}\n"));
        }
        out
    }
}

/// Select the F1-maximizing threshold from a PR curve. Falls back to a
/// zero threshold (marked untuned) when every candidate F1 is zero.
fn tune_threshold(curve: &PrCurve) -> (f64, bool) {
    let mut best_idx = 0usize;
    let mut best_f1 = f64::NEG_INFINITY;
    for k in 0..curve.thresholds.len() {
        let p = curve.precision[k];
        let r = curve.recall[k];
        let f1 = 2.0 * p * r / (p + r + F1_EPSILON);
        if f1 > best_f1 {
            best_f1 = f1;
            best_idx = k;
        }
    }

    if curve.thresholds.is_empty() || best_f1 <= 0.0 {
        warn!("all candidate F1 scores are zero; falling back to untuned threshold 0");
        (0.0, false)
    } else {
        (curve.thresholds[best_idx], true)
    }
}

/// Evaluate a detector against held-out labeled data.
///
/// For families with a continuous score the fitted detector scores the
/// held-out rows; the clustering family is re-fit on exactly these rows
/// (`fit_and_label` semantics) and evaluated through proxy scores of
/// -1.0/+1.0, which is why the detector is taken mutably.
pub fn evaluate(
    detector: &mut Detector,
    x: &FeatureMatrix,
    y_true: &Array1<i32>,
) -> Result<EvaluationResult> {
    if x.nrows() != y_true.len() {
        return Err(LogSentinelError::Evaluation(format!(
            "feature matrix has {} rows but label vector has {}",
            x.nrows(),
            y_true.len()
        )));
    }
    for (i, &label) in y_true.iter().enumerate() {
        if label != 1 && label != -1 {
            return Err(LogSentinelError::Evaluation(format!(
                "ground-truth label at row {i} must be +1 or -1, got {label}"
            )));
        }
    }

    let (scores, silhouette_score) = if detector.supports_continuous_score() {
        (detector.score(x)?, None)
    } else {
        let labels = detector.fit_and_label(x)?;
        let sil = detector
            .cluster_labels()
            .and_then(|c| silhouette(x.dense().as_ref(), c));
        (labels.mapv(|l| l as f64), sil)
    };

    // Negate so the swept statistic is higher = more anomalous
    let stat = scores.mapv(|s| -s);

    let curve = precision_recall_curve(y_true, &stat);
    let (threshold, tuned) = tune_threshold(&curve);

    // Flag anomalous where the negated score clears the threshold. The
    // comparison is inclusive so the applied labels reproduce the curve
    // point the sweep selected (the curve counts stat >= threshold).
    let y_pred = scores.mapv(|s| if s <= -threshold { -1 } else { 1 });
    let confusion = ConfusionMatrix::from_labels(y_true, &y_pred);

    let result = EvaluationResult {
        confusion,
        precision: confusion.precision(),
        recall: confusion.recall(),
        f1: confusion.f1(),
        false_positive_rate: confusion.false_positive_rate(),
        matthews_correlation: confusion.matthews_correlation(),
        roc_auc: roc_auc(y_true, &stat),
        pr_auc: average_precision(y_true, &stat),
        chosen_threshold: threshold,
        threshold_tuned: tuned,
        silhouette: silhouette_score,
    };

    info!(
        detector = detector.name(),
        f1 = result.f1,
        roc_auc = result.roc_auc,
        tuned,
        "evaluated detector"
    );
    Ok(result)
}
