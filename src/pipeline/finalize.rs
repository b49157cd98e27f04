//! Finalize stage: one summarizer call over analysis sections plus collapsed summaries.

use crate::summarization::{Summarizer, SummaryKind};

use super::types::{AnalysisCategory, AnalysisSection, PipelineError, PipelineState, Summary};

const SUMMARY_HEADING: &str = "DOCUMENT SUMMARY:";

/// Assemble the finalizer input.
///
/// Sections are grouped by category in [`AnalysisCategory::ALL`] order, keeping their relative
/// order within a category; each group is headed `"<CATEGORY> ANALYSIS:"`. Collapsed summaries
/// follow in document order. Returns `None` when both inputs are empty.
pub fn build_final_input(sections: &[AnalysisSection], collapsed: &[Summary]) -> Option<String> {
    if sections.is_empty() && collapsed.is_empty() {
        return None;
    }

    let mut blocks = Vec::new();
    for category in AnalysisCategory::ALL {
        let contents: Vec<&str> = sections
            .iter()
            .filter(|section| section.category == category)
            .map(|section| section.content.as_str())
            .collect();
        if contents.is_empty() {
            continue;
        }
        blocks.push(format!(
            "{} ANALYSIS:\n{}",
            category.as_str().to_uppercase(),
            contents.join("\n")
        ));
    }

    if !collapsed.is_empty() {
        let texts: Vec<&str> = collapsed.iter().map(|summary| summary.text.as_str()).collect();
        blocks.push(format!("{SUMMARY_HEADING}\n{}", texts.join("\n")));
    }

    Some(blocks.join("\n\n"))
}

/// Produce the final synthesis with exactly one summarizer call.
pub async fn finalize(
    summarizer: &dyn Summarizer,
    sections: &[AnalysisSection],
    collapsed: &[Summary],
) -> Result<String, PipelineError> {
    let input = build_final_input(sections, collapsed).ok_or(PipelineError::NoInput)?;
    tracing::debug!(
        sections = sections.len(),
        summaries = collapsed.len(),
        "Generating final summary"
    );
    summarizer
        .summarize(SummaryKind::Final, &input)
        .await
        .map_err(|source| PipelineError::Summarizer {
            stage: PipelineState::Finalizing,
            round: None,
            source,
        })
}
