//! Project filtering pipeline
//!
//! A project is kept only when every predicate passes. The chain is pure:
//! it never mutates its input, and re-applying it to its own output is a
//! no-op. Cheap flag checks run before the string scans.

use crate::types::{Project, ProjectKind};
use rust_decimal_macros::dec;

/// Owner countries that are never bid on. Matching is case-insensitive
/// bidirectional substring containment, so "Pakistan (remote)" and
/// truncated forms both hit.
pub const EXCLUDED_COUNTRIES: [&str; 9] = [
    "Pakistan",
    "India",
    "Bangladesh",
    "Indonesia",
    "Algeria",
    "Nigeria",
    "Egypt",
    "Nepal",
    "Israel",
];

/// Predicate 1: owner country not on the exclusion list
pub fn country_allowed(owner_country: Option<&str>) -> bool {
    let Some(country) = owner_country else {
        return true;
    };
    let country = country.trim().to_lowercase();
    if country.is_empty() {
        return true;
    }
    !EXCLUDED_COUNTRIES.iter().any(|excluded| {
        let excluded = excluded.to_lowercase();
        country.contains(&excluded) || excluded.contains(&country)
    })
}

/// Predicate 3: title restricted to printable ASCII
pub fn title_is_clean(title: &str) -> bool {
    title.chars().all(|c| matches!(c, ' '..='~'))
}

/// Predicate 5: fixed projects with a minimum at or below 5 are spam
pub fn budget_acceptable(project: &Project) -> bool {
    if project.kind != ProjectKind::Fixed {
        return true;
    }
    match project.budget.minimum {
        Some(minimum) => minimum > dec!(5),
        None => true,
    }
}

/// Full predicate conjunction for a single project
pub fn keeps(project: &Project) -> bool {
    !project.local
        && !project.currency_code.eq_ignore_ascii_case("INR")
        && budget_acceptable(project)
        && !project.upgrades.any()
        && title_is_clean(&project.title)
        && country_allowed(project.owner_country.as_deref())
}

/// Apply the pipeline to a candidate set
pub fn apply(projects: &[Project]) -> Vec<Project> {
    projects.iter().filter(|p| keeps(p)).cloned().collect()
}
