use serde::Serialize;

use crate::domain::records::CategoryLabel;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Bucket {
    pub label_id: String,
    pub name: String,
    pub total: u32,
}

/// Fresh per-query accumulator keyed by label. A card lands in the first bucket whose
/// label it carries, or in `unassigned`, so buckets plus `unassigned` always equal the
/// grand total.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CategoryTally {
    pub buckets: Vec<Bucket>,
    pub unassigned: u32,
}

impl CategoryTally {
    pub fn new<'a>(categories: impl IntoIterator<Item = &'a CategoryLabel>) -> Self {
        let buckets = categories
            .into_iter()
            .map(|category| Bucket {
                label_id: category.label_id.clone(),
                name: category.name.clone(),
                total: 0,
            })
            .collect();
        Self { buckets, unassigned: 0 }
    }

    /// Buckets straight from `(label_id, name)` pairs, used for raw board labels.
    pub fn from_labels<'a>(labels: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let buckets = labels
            .into_iter()
            .map(|(label_id, name)| Bucket {
                label_id: label_id.to_string(),
                name: name.to_string(),
                total: 0,
            })
            .collect();
        Self { buckets, unassigned: 0 }
    }

    /// Adds `amount` to the first bucket matching one of `label_ids`. Returns the bucket name.
    pub fn add(&mut self, label_ids: &[&str], amount: u32) -> Option<&str> {
        let position = self
            .buckets
            .iter()
            .position(|bucket| label_ids.iter().any(|id| *id == bucket.label_id));
        match position {
            Some(index) => {
                self.buckets[index].total += amount;
                Some(self.buckets[index].name.as_str())
            }
            None => {
                self.unassigned += amount;
                None
            }
        }
    }

    pub fn assigned_total(&self) -> u32 {
        self.buckets.iter().map(|bucket| bucket.total).sum()
    }

    pub fn grand_total(&self) -> u32 {
        self.assigned_total() + self.unassigned
    }

    pub fn get(&self, name: &str) -> Option<u32> {
        self.buckets.iter().find(|bucket| bucket.name == name).map(|bucket| bucket.total)
    }

    pub fn render(&self, unassigned_label: &str) -> String {
        let mut output: String = self
            .buckets
            .iter()
            .map(|bucket| format!("{}: {}\n", bucket.name, bucket.total))
            .collect();
        output.push_str(&format!("{unassigned_label}: {}\n", self.unassigned));
        output
    }
}
