use std::collections::HashSet;

use indexmap::IndexMap;
use serde::Serialize;

use crate::models::{DeploymentRecord, ReleaseRun, TestPlanResult, WorkItem};

pub const ALL: &str = "All";

/// Case-insensitive label histogram that remembers first-seen order.
///
/// Labels are matched ignoring case and surrounding whitespace, but charts
/// show the spelling seen first. Labels can be seeded with a zero count so
/// that a facet option survives even when the currently filtered set
/// contains no item with that label.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GroupCounts {
    counts: IndexMap<String, LabelCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct LabelCount {
    label: String,
    count: usize,
}

fn label_key(label: &str) -> Option<String> {
    let label = label.trim();
    if label.is_empty() {
        None
    } else {
        Some(label.to_lowercase())
    }
}

impl GroupCounts {
    fn slot(&mut self, label: &str) -> Option<&mut LabelCount> {
        let key = label_key(label)?;
        Some(self.counts.entry(key).or_insert_with(|| LabelCount {
            label: label.trim().to_string(),
            count: 0,
        }))
    }

    pub fn seeded<'a, I>(labels: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut counts = Self::default();
        for label in labels {
            counts.slot(label);
        }
        counts
    }

    pub fn tally<T, F>(mut self, items: &[T], classifier: F) -> Self
    where
        F: Fn(&T) -> Option<&str>,
    {
        for label in items.iter().filter_map(|item| classifier(item)) {
            if let Some(slot) = self.slot(label) {
                slot.count += 1;
            }
        }
        self
    }

    /// Chart-ready slices: zero-count labels are omitted.
    pub fn chart_data(&self) -> Vec<(String, usize)> {
        self.counts
            .values()
            .filter(|slot| slot.count > 0)
            .map(|slot| (slot.label.clone(), slot.count))
            .collect()
    }

    pub fn get(&self, label: &str) -> usize {
        label_key(label)
            .and_then(|key| self.counts.get(&key))
            .map_or(0, |slot| slot.count)
    }

    pub fn total(&self) -> usize {
        self.counts.values().map(|slot| slot.count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Counts items per label returned by `classifier`.
pub fn group_counts<T, F>(items: &[T], classifier: F) -> GroupCounts
where
    F: Fn(&T) -> Option<&str>,
{
    GroupCounts::default().tally(items, classifier)
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FacetValue {
    #[default]
    All,
    Exact(String),
}

impl FacetValue {
    /// Parses a user-supplied value, treating blank input and "All" as the wildcard.
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        if value.is_empty() || value.eq_ignore_ascii_case(ALL) {
            Self::All
        } else {
            Self::Exact(value.to_string())
        }
    }

    fn matches(&self, candidate: Option<&str>) -> bool {
        match self {
            Self::All => true,
            Self::Exact(wanted) => {
                candidate.is_some_and(|c| c.trim().to_lowercase() == wanted.to_lowercase())
            }
        }
    }
}

struct Facet<T> {
    name: &'static str,
    extract: fn(&T) -> Option<&str>,
    value: FacetValue,
}

/// Conjunction of facet filters. Each facet starts as the `All` wildcard.
pub struct FacetFilter<T> {
    facets: Vec<Facet<T>>,
}

impl<T> Default for FacetFilter<T> {
    fn default() -> Self {
        Self { facets: Vec::new() }
    }
}

impl<T> FacetFilter<T> {
    pub fn with_facet(mut self, name: &'static str, extract: fn(&T) -> Option<&str>) -> Self {
        self.facets.push(Facet {
            name,
            extract,
            value: FacetValue::All,
        });
        self
    }

    /// Sets the active value of a facet; returns `false` for an unknown facet name.
    pub fn set(&mut self, name: &str, value: FacetValue) -> bool {
        match self.facets.iter_mut().find(|facet| facet.name == name) {
            Some(facet) => {
                facet.value = value;
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.facets.iter().any(|facet| facet.value != FacetValue::All)
    }

    pub fn matches(&self, item: &T) -> bool {
        self.facets
            .iter()
            .all(|facet| facet.value.matches((facet.extract)(item)))
    }

    pub fn apply<'a>(&self, items: &'a [T]) -> Vec<&'a T> {
        items.iter().filter(|item| self.matches(item)).collect()
    }

    /// Dropdown options for a facet: `All`, then the distinct values of the
    /// full, unfiltered set in first-seen order.
    pub fn options(&self, name: &str, items: &[T]) -> Vec<String> {
        let Some(facet) = self.facets.iter().find(|facet| facet.name == name) else {
            return Vec::new();
        };

        let mut seen = HashSet::new();
        let mut options = vec![ALL.to_string()];
        for value in items.iter().filter_map(|item| (facet.extract)(item)) {
            let value = value.trim();
            if label_key(value).is_some_and(|key| seen.insert(key)) {
                options.push(value.to_string());
            }
        }
        options
    }
}

pub const ASSIGNEE_FACET: &str = "assignee";
pub const STATE_FACET: &str = "state";

/// Assignee and state facets over work items.
pub fn work_item_facets() -> FacetFilter<WorkItem> {
    FacetFilter::default()
        .with_facet(ASSIGNEE_FACET, |item: &WorkItem| item.assigned_to.as_deref())
        .with_facet(STATE_FACET, |item: &WorkItem| item.state.as_deref())
}

/// State histogram of the visible work items, keeping every state of the
/// full set as a (possibly zero) label.
pub fn state_histogram(all: &[WorkItem], visible: &[&WorkItem]) -> GroupCounts {
    GroupCounts::seeded(all.iter().filter_map(|item| item.state.as_deref()))
        .tally(visible, |item| item.state.as_deref())
}

/// Number of environments per status class across the given runs.
pub fn environment_histogram(runs: &[ReleaseRun]) -> GroupCounts {
    let classes: Vec<&'static str> = runs
        .iter()
        .flat_map(|run| run.environments.iter().map(|env| env.class().label()))
        .collect();
    group_counts(&classes, |label| Some(*label))
}

impl TestPlanResult {
    /// Pie slices in fixed order; empty slices are omitted.
    pub fn chart_data(&self) -> Vec<(&'static str, u64)> {
        [
            ("Passed", self.passed_tests),
            ("Incomplete", self.incomplete_tests),
            ("Not Applicable", self.not_applicable_tests),
            ("Blocked/Failed", self.unanalyzed_tests),
        ]
        .into_iter()
        .filter(|(_, count)| *count > 0)
        .collect()
    }

    pub fn total(&self) -> u64 {
        self.passed_tests + self.incomplete_tests + self.not_applicable_tests + self.unanalyzed_tests
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReleaseSummary {
    pub total: usize,
    pub active: usize,
}

impl ReleaseSummary {
    pub fn from_records(records: &[DeploymentRecord]) -> Self {
        let statuses = group_counts(records, |record| record.status.as_deref());
        Self {
            total: records.len(),
            active: statuses.get("active"),
        }
    }
}
