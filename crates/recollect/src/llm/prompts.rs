//! Prompt builders for the three generation contexts, plus the input
//! truncation and output cleanup they share.
//!
//! Model outputs are untrusted strings: every consumer trims whitespace and
//! surrounding quotes, and every prompt input is cut to a fixed byte budget
//! before it reaches the model.

use std::collections::HashMap;

use crate::types::{QaTurn, ScoredChunk};

/// Budget for concatenated cluster text in a labeling prompt.
pub const LABEL_TEXT_BUDGET: usize = 3000;
/// Budget for one file's joined chunk text in a follow-up prompt.
pub const FILE_SUMMARY_BUDGET: usize = 2000;

/// Question used when the model cannot produce one.
pub const GENERIC_FOLLOWUP: &str =
    "Can you describe anything else you remember about the file?";

/// Truncate to at most `budget` bytes without splitting a UTF-8 character.
pub fn truncate(text: &str, budget: usize) -> &str {
    if text.len() <= budget {
        return text;
    }
    let mut end = budget;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Trim whitespace and surrounding quotes.
pub fn clean_short_answer(raw: &str) -> String {
    raw.trim().trim_matches('"').trim_matches('\'').trim().to_string()
}

pub fn expand_query(query: &str) -> String {
    format!(
        "You are a search-query expander. Given the user's short query, \
         rewrite it as a single enriched paragraph that includes synonyms, \
         related terms, likely full titles, and geographic context if \
         applicable. Do NOT explain — output ONLY the expanded query.\n\n\
         User query: {}\n\nExpanded query:",
        query
    )
}

pub fn label_cluster(cluster_text: &str) -> String {
    format!(
        "You are an expert librarian. Given the following collection of \
         text excerpts from documents, provide a concise descriptive label \
         (a short phrase) that captures the main topic. \
         Return ONLY the label, nothing else.\n\nText:\n{}\n\nLabel:",
        truncate(cluster_text, LABEL_TEXT_BUDGET)
    )
}

pub fn followup_question(
    file_summaries: &[(String, String)],
    conversation: &[QaTurn],
    question_num: u32,
    max_questions: u32,
) -> String {
    let files_block = file_summaries
        .iter()
        .map(|(file, summary)| format!("FILE: {}\n{}", file, summary))
        .collect::<Vec<_>>()
        .join("\n\n");

    let history = if conversation.is_empty() {
        "(no questions asked yet)".to_string()
    } else {
        conversation
            .iter()
            .map(|turn| format!("Q: {}\nA: {}", turn.question, turn.answer))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        "You are helping a user find a specific file they half-remember. \
         Below are summaries of the remaining candidate files, plus the \
         conversation so far.\n\n\
         Candidate files:\n{}\n\n\
         Conversation so far:\n{}\n\n\
         This is follow-up question {} of {}. \
         Generate ONE short, concrete yes/no or multiple-choice question \
         that would best help narrow down which file the user is looking for. \
         Focus on distinguishing features: topic, geography, date, format, \
         methodology, organisation, etc. \
         Return ONLY the question, nothing else.",
        files_block, history, question_num, max_questions
    )
}

/// Join each file's chunk texts (first-seen file order) and truncate each
/// summary to its budget, so the model has something concrete per candidate.
pub fn file_summaries(points: &[ScoredChunk]) -> Vec<(String, String)> {
    let mut order: Vec<String> = Vec::new();
    let mut texts: HashMap<String, Vec<&str>> = HashMap::new();
    for pt in points {
        if !texts.contains_key(&pt.file) {
            order.push(pt.file.clone());
        }
        texts
            .entry(pt.file.clone())
            .or_default()
            .push(pt.chunk_text.as_str());
    }

    order
        .into_iter()
        .map(|file| {
            let joined = texts.get(&file).map(|v| v.join("\n")).unwrap_or_default();
            let summary = truncate(&joined, FILE_SUMMARY_BUDGET).to_string();
            (file, summary)
        })
        .collect()
}
