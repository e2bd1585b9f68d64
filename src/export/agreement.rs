//! Inter-annotator agreement over (coder, item, label) triples with the
//! nominal distance function: Krippendorff's alpha, Cohen's kappa
//! (averaged over coder pairs), Scott's pi and Bennett's S. Degenerate
//! inputs (a single coder, no label variation, a coder pair with no items
//! in common) yield `None` instead of an error.

use indexmap::{IndexMap, IndexSet};
use itertools::Itertools;
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct AgreementScores {
    pub alpha: f64,
    pub kappa: f64,
    pub pi: f64,
    pub s: f64,
}

pub struct AnnotationTask {
    coders: IndexSet<String>,
    items: IndexSet<String>,
    labels: IndexSet<String>,
    // First label wins when a coder labels the same item twice.
    assignments: IndexMap<(String, String), String>,
}

impl AnnotationTask {
    pub fn new(triples: Vec<(String, String, String)>) -> Self {
        let mut task = AnnotationTask {
            coders: IndexSet::new(),
            items: IndexSet::new(),
            labels: IndexSet::new(),
            assignments: IndexMap::new(),
        };
        for (coder, item, label) in triples {
            task.coders.insert(coder.clone());
            task.items.insert(item.clone());
            task.labels.insert(label.clone());
            task.assignments.entry((coder, item)).or_insert(label);
        }
        task
    }

    fn label_of(&self, coder: &str, item: &str) -> Option<&str> {
        self.assignments
            .get(&(coder.to_string(), item.to_string()))
            .map(String::as_str)
    }

    /// Observed agreement between two coders over the items both labeled.
    fn observed_agreement(&self, coder_a: &str, coder_b: &str) -> Option<f64> {
        let mut shared = 0usize;
        let mut agreed = 0usize;
        for item in &self.items {
            let (Some(a), Some(b)) =
                (self.label_of(coder_a, item), self.label_of(coder_b, item))
            else {
                continue;
            };
            shared += 1;
            if a == b {
                agreed += 1;
            }
        }
        match shared {
            0 => None,
            _ => Some(agreed as f64 / shared as f64),
        }
    }

    /// Mean observed agreement over all coder pairs. `None` when there are
    /// fewer than two coders or a pair shares no items.
    fn average_observed_agreement(&self) -> Option<f64> {
        let pairs: Vec<f64> = self
            .coders
            .iter()
            .tuple_combinations()
            .map(|(a, b)| self.observed_agreement(a, b))
            .collect::<Option<Vec<f64>>>()?;
        match pairs.len() {
            0 => None,
            n => Some(pairs.iter().sum::<f64>() / n as f64),
        }
    }

    /// Label frequency of one coder, normalized over the items they coded.
    fn label_distribution(&self, coder: &str) -> IndexMap<&str, f64> {
        let mut counts: IndexMap<&str, f64> = IndexMap::new();
        let mut total = 0.0;
        for ((c, _), label) in &self.assignments {
            if c == coder {
                *counts.entry(label.as_str()).or_insert(0.0) += 1.0;
                total += 1.0;
            }
        }
        for value in counts.values_mut() {
            *value /= total;
        }
        counts
    }

    /// Cohen's kappa averaged over all coder pairs.
    pub fn kappa(&self) -> Option<f64> {
        let pairs: Vec<f64> = self
            .coders
            .iter()
            .tuple_combinations()
            .map(|(coder_a, coder_b)| {
                let observed = self.observed_agreement(coder_a, coder_b)?;
                let dist_a = self.label_distribution(coder_a);
                let dist_b = self.label_distribution(coder_b);
                let expected: f64 = dist_a
                    .iter()
                    .map(|(label, p_a)| {
                        p_a * dist_b.get(label).copied().unwrap_or(0.0)
                    })
                    .sum();
                chance_corrected(observed, expected)
            })
            .collect::<Option<Vec<f64>>>()?;
        match pairs.len() {
            0 => None,
            n => Some(pairs.iter().sum::<f64>() / n as f64),
        }
    }

    /// Scott's pi, with the expected agreement pooled over all coders.
    pub fn pi(&self) -> Option<f64> {
        let observed = self.average_observed_agreement()?;
        let total = self.assignments.len() as f64;
        let expected: f64 = self
            .labels
            .iter()
            .map(|label| {
                let count = self
                    .assignments
                    .values()
                    .filter(|l| *l == label)
                    .count() as f64;
                (count / total).powi(2)
            })
            .sum();
        chance_corrected(observed, expected)
    }

    /// Bennett's S: expected agreement is uniform over the label set.
    pub fn s(&self) -> Option<f64> {
        let observed = self.average_observed_agreement()?;
        let expected = 1.0 / self.labels.len() as f64;
        chance_corrected(observed, expected)
    }

    /// Krippendorff's alpha with the nominal distance.
    pub fn alpha(&self) -> Option<f64> {
        let item_count = self.items.len() as f64;
        let coder_count = self.coders.len() as f64;
        if self.items.is_empty() || self.coders.len() < 2 {
            return None;
        }

        // Per-item label counts.
        let mut observed_disagreement = 0.0;
        for item in &self.items {
            let mut counts: IndexMap<&str, f64> = IndexMap::new();
            for coder in &self.coders {
                if let Some(label) = self.label_of(coder, item) {
                    *counts.entry(label).or_insert(0.0) += 1.0;
                }
            }
            for (label_a, n_a) in &counts {
                for (label_b, n_b) in &counts {
                    if label_a != label_b {
                        observed_disagreement += n_a * n_b;
                    }
                }
            }
        }
        observed_disagreement /=
            item_count * coder_count * (coder_count - 1.0);

        // Pooled label counts.
        let mut totals: IndexMap<&str, f64> = IndexMap::new();
        for label in self.assignments.values() {
            *totals.entry(label.as_str()).or_insert(0.0) += 1.0;
        }
        let mut expected_disagreement = 0.0;
        for (label_a, n_a) in &totals {
            for (label_b, n_b) in &totals {
                if label_a != label_b {
                    expected_disagreement += n_a * n_b;
                }
            }
        }
        let pooled = item_count * coder_count;
        expected_disagreement /= pooled * (pooled - 1.0);

        if expected_disagreement == 0.0 {
            return None;
        }
        Some(1.0 - observed_disagreement / expected_disagreement)
    }

    /// All four statistics, or `None` as soon as one of them is
    /// unavailable.
    pub fn scores(&self) -> Option<AgreementScores> {
        Some(AgreementScores {
            alpha: self.alpha()?,
            kappa: self.kappa()?,
            pi: self.pi()?,
            s: self.s()?,
        })
    }
}

fn chance_corrected(observed: f64, expected: f64) -> Option<f64> {
    let denominator = 1.0 - expected;
    if denominator == 0.0 {
        return None;
    }
    Some((observed - expected) / denominator)
}
