//! Page-boundary cleanup: strip running headers and footers.
//!
//! PDF text layers repeat the journal name, author line or page furniture at
//! the top and bottom of every page. Left in, they interleave with body text
//! and waste prompt tokens. The heuristic here is deliberately simple:
//!
//! * a page's first line is a header candidate, its last line a footer candidate;
//! * a candidate that appears on **more than** `floor(n / 2)` pages is a pattern;
//! * each page drops its first line if it is a header pattern and its last
//!   line if it is a footer pattern (a one-line page may lose it to either).
//!
//! False positives (a short content line that genuinely recurs) and false
//! negatives (footers carrying the page number) are accepted. The threshold
//! is fixed so that re-extracting an old batch yields the same text.

use std::collections::{HashMap, HashSet};

/// Lines that must be stripped from the top and bottom of pages.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunningLines {
    pub headers: HashSet<String>,
    pub footers: HashSet<String>,
}

/// Detect header/footer patterns across already-split pages.
pub fn detect_running_lines(pages: &[Vec<&str>]) -> RunningLines {
    let threshold = pages.len() / 2;

    let mut first_counts: HashMap<&str, usize> = HashMap::new();
    let mut last_counts: HashMap<&str, usize> = HashMap::new();
    for lines in pages {
        if let Some(first) = lines.first() {
            *first_counts.entry(*first).or_default() += 1;
        }
        if let Some(last) = lines.last() {
            *last_counts.entry(*last).or_default() += 1;
        }
    }

    let select = |counts: HashMap<&str, usize>| -> HashSet<String> {
        counts
            .into_iter()
            .filter(|(line, count)| !line.is_empty() && *count > threshold)
            .map(|(line, _)| line.to_string())
            .collect()
    };

    RunningLines {
        headers: select(first_counts),
        footers: select(last_counts),
    }
}

/// Join per-page raw text into one cleaned document string.
///
/// Pages are trimmed, split on `\n`, stripped of running lines, then joined
/// with a blank line between pages. With fewer than two pages nothing is
/// stripped and the pages are joined with a single newline.
pub fn normalize<S: AsRef<str>>(pages: &[S]) -> String {
    if pages.len() < 2 {
        return pages
            .iter()
            .map(|p| p.as_ref())
            .collect::<Vec<_>>()
            .join("\n");
    }

    let split: Vec<Vec<&str>> = pages
        .iter()
        .map(|p| p.as_ref().trim().split('\n').collect())
        .collect();
    let running = detect_running_lines(&split);

    split
        .into_iter()
        .map(|mut lines| {
            if lines
                .first()
                .is_some_and(|l| running.headers.contains(*l))
            {
                lines.remove(0);
            }
            if lines.last().is_some_and(|l| running.footers.contains(*l)) {
                lines.pop();
            }
            lines.join("\n")
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
