//! Query-to-step correlation for progress display
//!
//! A step's signature is its first three whitespace-delimited tokens,
//! lower-cased. A query belongs to every step whose signature it contains.
//! Ties are not broken. Nothing here is stored on the session; callers
//! recompute it on every read.

use serde::Serialize;
use std::collections::BTreeMap;

use super::types::SearchResult;

const SIGNATURE_TOKENS: usize = 3;
const MIN_PROGRESS: u8 = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepProgress {
    pub index: usize,
    pub description: String,
    pub signature: String,
    pub active: bool,
    pub completed: bool,
    /// Queries associated with this step, in key order
    pub queries: Vec<String>,
    /// Results of the associated queries, concatenated
    pub results: Vec<SearchResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Correlation {
    pub steps: Vec<StepProgress>,
    pub progress_percentage: u8,
    pub total_results: usize,
}

pub fn step_signature(step: &str) -> String {
    step.split_whitespace()
        .take(SIGNATURE_TOKENS)
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Blank steps have an empty signature and match nothing
pub fn query_matches(query: &str, signature: &str) -> bool {
    !signature.is_empty() && query.to_lowercase().contains(signature)
}

/// Plan index of the active step; a step absent from the plan is inactive
pub fn active_index(plan: &[String], current_step: Option<&str>) -> Option<usize> {
    let current = current_step?;
    plan.iter().position(|step| step == current)
}

pub fn progress_percentage(plan_len: usize, active: Option<usize>) -> u8 {
    match active {
        Some(index) if plan_len > 0 => {
            let pct = (index as f64 / plan_len as f64 * 100.0).round();
            pct.clamp(MIN_PROGRESS as f64, 100.0) as u8
        }
        _ => MIN_PROGRESS,
    }
}

pub fn is_completed(index: usize, active: Option<usize>, total_results: usize) -> bool {
    match active {
        Some(active) => index != active && total_results > 0 && index < active,
        None => false,
    }
}

pub fn correlate(
    plan: &[String],
    current_step: Option<&str>,
    search_results: &BTreeMap<String, Vec<SearchResult>>,
) -> Correlation {
    let active = active_index(plan, current_step);
    let total_results = search_results.values().map(Vec::len).sum();

    let steps = plan
        .iter()
        .enumerate()
        .map(|(index, description)| {
            let signature = step_signature(description);
            let matched: Vec<(&String, &Vec<SearchResult>)> = search_results
                .iter()
                .filter(|(query, _)| query_matches(query, &signature))
                .collect();

            StepProgress {
                index,
                description: description.clone(),
                active: active == Some(index),
                completed: is_completed(index, active, total_results),
                queries: matched.iter().map(|(q, _)| (*q).clone()).collect(),
                results: matched
                    .iter()
                    .flat_map(|(_, results)| results.iter().cloned())
                    .collect(),
                signature,
            }
        })
        .collect();

    Correlation {
        steps,
        progress_percentage: progress_percentage(plan.len(), active),
        total_results,
    }
}
