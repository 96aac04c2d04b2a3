//! Checkpoint Manager: owns never-compressed sections, task
//! definitions, and architecture decisions, and ages checkpoint summaries
//! to coarser tiers as they fall further behind the live conversation.

use regex::Regex;

use ccme_core::{CheckpointId, Message, Role};

use crate::constants::{
    CHECKPOINT_AGE_LEVEL_1, CHECKPOINT_AGE_LEVEL_2, EXTRACT_MAX_DECISIONS, EXTRACT_MAX_FILES,
    MERGE_MAX_DECISIONS, MERGE_MAX_FILES,
};
use crate::conversation::{
    ArchitectureDecision, Checkpoint, CheckpointLevel, ConversationContext, NeverCompressedSection,
    TaskDefinition,
};

/// Regex rules a mode supplies for harvesting decisions and file references
/// out of raw message text during compression.
#[derive(Clone, Debug)]
pub struct ModeProfile {
    pub decision_patterns: Vec<Regex>,
    pub file_patterns: Vec<Regex>,
}

impl ModeProfile {
    /// A profile matching the common conventions of engineering chat logs:
    /// "Decided to ...", "We will ...", and bare file-path-looking tokens.
    #[must_use]
    pub fn default_engineering() -> Self {
        Self {
            decision_patterns: vec![
                Regex::new(r"(?i)\b(?:decided to|we will|going with|chose to)\s+(.+?)[.\n]").unwrap(),
            ],
            file_patterns: vec![
                Regex::new(r"\b[\w./-]+\.(?:rs|toml|md|json|yaml|yml|ts|js|py)\b").unwrap(),
            ],
        }
    }
}

/// Serialize task definition, architecture decisions, and explicit
/// never-compressed entries into a canonical form that survives
/// compression verbatim.
#[must_use]
pub fn preserve_never_compressed(context: &ConversationContext) -> Vec<NeverCompressedSection> {
    let mut sections = Vec::new();
    if let Some(task) = &context.task {
        sections.push(NeverCompressedSection {
            label: "task".to_owned(),
            content: task.description.clone(),
        });
    }
    for decision in &context.architecture_decisions {
        sections.push(NeverCompressedSection {
            label: "architecture-decision".to_owned(),
            content: decision.summary.clone(),
        });
    }
    sections.extend(context.never_compressed.iter().cloned());
    sections
}

/// Rehydrate preserved sections back into system messages at the sequence
/// head, in the same order they were preserved.
#[must_use]
pub fn reconstruct_never_compressed(sections: &[NeverCompressedSection], timestamp: i64) -> Vec<Message> {
    sections
        .iter()
        .map(|s| Message::new(Role::System, format!("[{}] {}", s.label, s.content), timestamp))
        .collect()
}

fn dedup_capped(items: impl IntoIterator<Item = String>, cap: usize) -> Vec<String> {
    let mut seen = Vec::new();
    for item in items {
        if seen.len() >= cap {
            break;
        }
        if !seen.contains(&item) {
            seen.push(item);
        }
    }
    seen
}

/// Merge a run of old checkpoints into `target`: concatenates summary
/// content, unions key-decision and file lists (capped, insertion order
/// preserved), sums token counts, takes the min of levels, and assigns a
/// fresh id.
#[must_use]
pub fn merge_checkpoints(old: &[Checkpoint], target: &Checkpoint, timestamp: i64) -> Checkpoint {
    let mut all = old.to_vec();
    all.push(target.clone());

    let summary_text = all
        .iter()
        .map(|c| c.summary.content.as_text())
        .collect::<Vec<_>>()
        .join("\n\n");

    let key_decisions = dedup_capped(
        all.iter().flat_map(|c| c.key_decisions.iter().cloned()),
        MERGE_MAX_DECISIONS,
    );
    let file_references = dedup_capped(
        all.iter().flat_map(|c| c.file_references.iter().cloned()),
        MERGE_MAX_FILES,
    );

    let original_tokens = all.iter().map(|c| c.original_tokens).sum();
    let current_tokens = all.iter().map(|c| c.current_tokens).sum();
    let level = all.iter().map(|c| c.level).min().unwrap_or(CheckpointLevel::Compact);
    let compression_count = all.iter().map(|c| c.compression_count).max().unwrap_or(0) + 1;

    let first = all.first().expect("merge requires at least one checkpoint");
    let last = all.last().expect("merge requires at least one checkpoint");

    Checkpoint {
        id: CheckpointId::new(),
        level,
        covered_range: crate::conversation::CoveredRange {
            first_message_id: first.covered_range.first_message_id.clone(),
            last_message_id: last.covered_range.last_message_id.clone(),
            message_count: all.iter().map(|c| c.covered_range.message_count).sum(),
        },
        summary: Message::new(Role::System, summary_text, timestamp),
        created_at: first.created_at,
        last_compressed_at: timestamp,
        original_tokens,
        current_tokens,
        compression_count,
        compression_number: last.compression_number,
        key_decisions,
        file_references,
    }
}

/// Harvest decisions and modified-file references from `messages` using
/// `profile`'s regex rules. Both lists are deduplicated and capped.
#[must_use]
pub fn extract_critical_info(messages: &[Message], profile: &ModeProfile) -> (Vec<String>, Vec<String>) {
    let mut decisions = Vec::new();
    let mut files = Vec::new();

    for message in messages {
        let text = message.content.as_text();
        for pattern in &profile.decision_patterns {
            for capture in pattern.captures_iter(&text) {
                if let Some(m) = capture.get(1) {
                    decisions.push(m.as_str().trim().to_owned());
                }
            }
        }
        for pattern in &profile.file_patterns {
            for m in pattern.find_iter(&text) {
                files.push(m.as_str().to_owned());
            }
        }
    }

    (
        dedup_capped(decisions, EXTRACT_MAX_DECISIONS),
        dedup_capped(files, EXTRACT_MAX_FILES),
    )
}

/// Age every checkpoint by its distance (in compressions) from
/// `current_compression_number`, recomputing its summary and token count
/// whenever its level drops. `re_render` produces the coarser summary text
/// for a checkpoint moving to `level`; `estimate` counts its tokens.
pub fn compress_old_checkpoints(
    checkpoints: &mut [Checkpoint],
    current_compression_number: u64,
    re_render: impl Fn(&Checkpoint, CheckpointLevel) -> String,
    estimate: impl Fn(&str) -> u32,
) {
    for checkpoint in checkpoints.iter_mut() {
        let age = current_compression_number.saturating_sub(checkpoint.compression_number);
        let target_level = if age >= u64::from(CHECKPOINT_AGE_LEVEL_1) {
            CheckpointLevel::Compact
        } else if age >= u64::from(CHECKPOINT_AGE_LEVEL_2) {
            CheckpointLevel::Moderate
        } else {
            CheckpointLevel::Rich
        };
        if target_level < checkpoint.level {
            let rendered = re_render(checkpoint, target_level);
            let tokens = estimate(&rendered);
            checkpoint.summary = checkpoint.summary.with_content(rendered);
            checkpoint.age_to(target_level, tokens);
        }
    }
}

/// Default re-render rule: level 2 keeps the first 5 lines plus the top-3
/// key decisions; level 1 keeps a single line.
#[must_use]
pub fn default_re_render(checkpoint: &Checkpoint, level: CheckpointLevel) -> String {
    let text = checkpoint.summary.content.as_text();
    match level {
        CheckpointLevel::Rich => text,
        CheckpointLevel::Moderate => {
            let lines: Vec<&str> = text.lines().take(5).collect();
            let decisions: Vec<&str> = checkpoint
                .key_decisions
                .iter()
                .take(3)
                .map(String::as_str)
                .collect();
            let mut out = lines.join("\n");
            if !decisions.is_empty() {
                out.push_str("\nkey decisions: ");
                out.push_str(&decisions.join("; "));
            }
            out
        }
        CheckpointLevel::Compact => text.lines().next().unwrap_or("").to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::CoveredRange;

    fn checkpoint(level: CheckpointLevel, compression_number: u64, text: &str) -> Checkpoint {
        Checkpoint {
            id: CheckpointId::new(),
            level,
            covered_range: CoveredRange {
                first_message_id: "a".into(),
                last_message_id: "b".into(),
                message_count: 5,
            },
            summary: Message::new(Role::System, text, 0),
            created_at: 0,
            last_compressed_at: 0,
            original_tokens: 100,
            current_tokens: 100,
            compression_count: 0,
            compression_number,
            key_decisions: vec!["d1".into()],
            file_references: vec!["a.rs".into()],
        }
    }

    #[test]
    fn preserve_never_compressed_includes_task_and_decisions() {
        let mut ctx = ConversationContext::new(ccme_core::SessionId::new(), "m", 1000);
        ctx.task = Some(TaskDefinition {
            description: "ship CCME".into(),
        });
        ctx.architecture_decisions.push(ArchitectureDecision {
            summary: "use checkpoints".into(),
            recorded_at: 0,
        });
        let sections = preserve_never_compressed(&ctx);
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].label, "task");
    }

    #[test]
    fn reconstruct_produces_system_messages_in_order() {
        let sections = vec![
            NeverCompressedSection {
                label: "task".into(),
                content: "x".into(),
            },
            NeverCompressedSection {
                label: "architecture-decision".into(),
                content: "y".into(),
            },
        ];
        let messages = reconstruct_never_compressed(&sections, 5);
        assert_eq!(messages.len(), 2);
        assert!(messages.iter().all(Message::is_system));
    }

    #[test]
    fn merge_checkpoints_unions_and_caps_lists() {
        let mut old = Vec::new();
        for i in 0..12 {
            let mut cp = checkpoint(CheckpointLevel::Rich, 0, "old");
            cp.key_decisions = vec![format!("d{i}")];
            cp.file_references = vec![format!("f{i}.rs")];
            old.push(cp);
        }
        let target = checkpoint(CheckpointLevel::Compact, 5, "target");
        let merged = merge_checkpoints(&old, &target, 10);
        assert!(merged.key_decisions.len() <= MERGE_MAX_DECISIONS);
        assert_eq!(merged.level, CheckpointLevel::Compact);
        assert_eq!(merged.original_tokens, 100 * 13);
    }

    #[test]
    fn extract_critical_info_harvests_and_caps() {
        let profile = ModeProfile::default_engineering();
        let messages = vec![Message::assistant(
            "We will refactor src/lib.rs and decided to use hybrid compression.",
            0,
        )];
        let (decisions, files) = extract_critical_info(&messages, &profile);
        assert!(!decisions.is_empty());
        assert!(files.iter().any(|f| f.contains("lib.rs")));
    }

    #[test]
    fn compress_old_checkpoints_ages_by_distance() {
        let mut checkpoints = vec![checkpoint(CheckpointLevel::Rich, 0, "line one\nline two\nmore")];
        compress_old_checkpoints(&mut checkpoints, 6, default_re_render, |s| s.len() as u32);
        assert_eq!(checkpoints[0].level, CheckpointLevel::Compact);
        assert_eq!(checkpoints[0].summary.content.as_text(), "line one");
    }

    #[test]
    fn compress_old_checkpoints_keeps_rich_when_young() {
        let mut checkpoints = vec![checkpoint(CheckpointLevel::Rich, 5, "fresh")];
        compress_old_checkpoints(&mut checkpoints, 6, default_re_render, |s| s.len() as u32);
        assert_eq!(checkpoints[0].level, CheckpointLevel::Rich);
    }
}
