//! Console summary of a run.

use crate::models::{ArtifactKind, ProcessingRecord, RunResult};
use chrono::NaiveDate;
use itertools::Itertools;

/// Label used for an artifact in the `[+]` line.
fn artifact_label(kind: ArtifactKind) -> &'static str {
    match kind {
        ArtifactKind::Html => "html",
        ArtifactKind::Md => "md",
        ArtifactKind::Txt => "caption",
        ArtifactKind::Image => "image",
    }
}

fn record_lines(record: &ProcessingRecord) -> impl Iterator<Item = String> + '_ {
    let produced = [
        ArtifactKind::Html,
        ArtifactKind::Md,
        ArtifactKind::Txt,
        ArtifactKind::Image,
    ]
    .into_iter()
    .filter(|kind| record.paths.contains_key(kind))
    .map(artifact_label)
    .join("+");
    let produced = if produced.is_empty() {
        "nothing written".to_string()
    } else {
        produced
    };

    std::iter::once(format!("[+] {}: {}", record.slug, produced)).chain(
        record
            .errors
            .iter()
            .map(move |e| format!("[!] {}: {}", record.slug, e)),
    )
}

/// Render the human-facing run summary, one line per item and error plus a
/// closing line.
///
/// # Examples
///
/// ```ignore
/// [+] big-breach-10m-records-exposed: html+md+caption+image
/// [✓] Done. 1 post kit(s) in /srv/THN/2025/05/06
/// ```
pub fn render_report(result: &RunResult, target_date: NaiveDate) -> String {
    if result.count() == 0 {
        return format!("[i] No items on {}.\n", target_date.format("%Y-%m-%d"));
    }
    let mut out = result
        .items()
        .iter()
        .flat_map(record_lines)
        .map(|line| line + "\n")
        .collect::<String>();
    out.push_str(&format!(
        "[✓] Done. {} post kit(s) in {}\n",
        result.count(),
        result.dir().display()
    ));
    out
}
