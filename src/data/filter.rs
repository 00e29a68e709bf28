use std::collections::BTreeMap;

use super::model::{Dataset, Label};

// ---------------------------------------------------------------------------
// Row selection by label
// ---------------------------------------------------------------------------

/// Row indices grouped by label. Both labels are always present as keys, so
/// a class with no rows maps to an empty list.
pub type LabelPartition = BTreeMap<Label, Vec<usize>>;

/// Group the rows of `rows` (indices into `dataset`) by their label,
/// preserving the order of `rows` inside each group.
pub fn partition_rows(dataset: &Dataset, rows: &[usize]) -> LabelPartition {
    let mut groups: LabelPartition = Label::ALL.iter().map(|&l| (l, Vec::new())).collect();
    for &row in rows {
        let label = dataset.records()[row].label;
        groups.entry(label).or_default().push(row);
    }
    groups
}

/// Group every row of the dataset by label.
pub fn partition_by_label(dataset: &Dataset) -> LabelPartition {
    let all: Vec<usize> = (0..dataset.len()).collect();
    partition_rows(dataset, &all)
}

/// Indices of rows carrying `label`, in dataset order.
pub fn rows_with_label(dataset: &Dataset, label: Label) -> Vec<usize> {
    dataset
        .records()
        .iter()
        .enumerate()
        .filter(|(_, r)| r.label == label)
        .map(|(i, _)| i)
        .collect()
}
