use std::collections::BTreeMap;

use crate::descriptor::RepositoryDescriptor;

/// Summary counts over a completed work set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Statistics {
    pub total: usize,
    pub empty: usize,
    pub errored: usize,
    /// Language name to repository count; unset languages count as "Not specified".
    pub languages: BTreeMap<String, usize>,
}

impl Statistics {
    pub fn compute(work_set: &[RepositoryDescriptor]) -> Self {
        let mut stats = Statistics {
            total: work_set.len(),
            ..Default::default()
        };

        for descriptor in work_set {
            if descriptor.is_empty {
                stats.empty += 1;
            }
            if descriptor.error().is_some() {
                stats.errored += 1;
            }
            *stats
                .languages
                .entry(descriptor.language_or_default().to_string())
                .or_insert(0) += 1;
        }

        stats
    }
}
