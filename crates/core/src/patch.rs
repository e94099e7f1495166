//! Line-based diff, patch application and hunk-level conflict detection for
//! content bodies.
//!
//! Patches are rendered as unified-diff text (hunk headers plus ` `/`+`/`-`
//! prefixed lines, with `\ No newline at end of file` markers) and parsed
//! back losslessly, so `apply_patch(old, &diff_content(old, new)) == new`
//! holds for any pair of strings.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Unchanged lines kept around each change.
pub const CONTEXT_LINES: usize = 3;

const NO_NEWLINE_MARKER: &str = "\\ No newline at end of file";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One line of a hunk. The string keeps its trailing `\n` when the source
/// line had one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchLine {
    Context(String),
    Added(String),
    Removed(String),
}

impl PatchLine {
    fn text(&self) -> &str {
        match self {
            Self::Context(t) | Self::Added(t) | Self::Removed(t) => t,
        }
    }

    fn prefix(&self) -> char {
        match self {
            Self::Context(_) => ' ',
            Self::Added(_) => '+',
            Self::Removed(_) => '-',
        }
    }

    fn text_mut(&mut self) -> &mut String {
        match self {
            Self::Context(t) | Self::Added(t) | Self::Removed(t) => t,
        }
    }
}

/// A contiguous cluster of changes with surrounding context.
///
/// `old_start`/`new_start` follow unified-diff numbering: 1-based, except
/// that an empty range names the line *after which* it sits (0 for the top).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    pub old_start: usize,
    pub old_len: usize,
    pub new_start: usize,
    pub new_len: usize,
    pub lines: Vec<PatchLine>,
}

impl Hunk {
    /// 0-based index of the first old line this hunk covers.
    fn old_index(&self) -> usize {
        if self.old_len == 0 {
            self.old_start
        } else {
            self.old_start - 1
        }
    }
}

/// An ordered list of non-overlapping hunks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Patch {
    pub hunks: Vec<Hunk>,
}

/// Line counts for a patch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PatchSummary {
    pub lines_added: usize,
    pub lines_removed: usize,
}

impl Patch {
    pub fn is_empty(&self) -> bool {
        self.hunks.is_empty()
    }

    pub fn summary(&self) -> PatchSummary {
        let mut summary = PatchSummary::default();
        for line in self.hunks.iter().flat_map(|h| &h.lines) {
            match line {
                PatchLine::Added(_) => summary.lines_added += 1,
                PatchLine::Removed(_) => summary.lines_removed += 1,
                PatchLine::Context(_) => {}
            }
        }
        summary
    }
}

// ---------------------------------------------------------------------------
// Rendering and parsing
// ---------------------------------------------------------------------------

impl fmt::Display for Patch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for hunk in &self.hunks {
            writeln!(
                f,
                "@@ -{},{} +{},{} @@",
                hunk.old_start, hunk.old_len, hunk.new_start, hunk.new_len
            )?;
            for line in &hunk.lines {
                let text = line.text();
                match text.strip_suffix('\n') {
                    Some(body) => writeln!(f, "{}{}", line.prefix(), body)?,
                    None => {
                        writeln!(f, "{}{}", line.prefix(), text)?;
                        writeln!(f, "{NO_NEWLINE_MARKER}")?;
                    }
                }
            }
        }
        Ok(())
    }
}

impl FromStr for Patch {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut hunks: Vec<Hunk> = Vec::new();

        for raw in s.split_inclusive('\n') {
            let line = raw.strip_suffix('\n').unwrap_or(raw);
            if let Some(header) = line.strip_prefix("@@ ") {
                hunks.push(parse_hunk_header(header)?);
                continue;
            }
            let hunk = hunks
                .last_mut()
                .ok_or_else(|| malformed("patch line before first hunk header"))?;
            if line == NO_NEWLINE_MARKER {
                let last = hunk
                    .lines
                    .last_mut()
                    .ok_or_else(|| malformed("newline marker without a preceding line"))?;
                if last.text_mut().pop() != Some('\n') {
                    return Err(malformed("duplicate newline marker"));
                }
                continue;
            }
            let mut chars = line.chars();
            let prefix = chars.next();
            let text = format!("{}\n", chars.as_str());
            let parsed = match prefix {
                Some(' ') => PatchLine::Context(text),
                Some('+') => PatchLine::Added(text),
                Some('-') => PatchLine::Removed(text),
                _ => return Err(malformed(&format!("unexpected patch line '{line}'"))),
            };
            hunk.lines.push(parsed);
        }

        for hunk in &hunks {
            let old = hunk
                .lines
                .iter()
                .filter(|l| !matches!(l, PatchLine::Added(_)))
                .count();
            let new = hunk
                .lines
                .iter()
                .filter(|l| !matches!(l, PatchLine::Removed(_)))
                .count();
            if old != hunk.old_len || new != hunk.new_len {
                return Err(malformed(&format!(
                    "hunk at -{} declares {}/{} lines but carries {old}/{new}",
                    hunk.old_start, hunk.old_len, hunk.new_len
                )));
            }
        }

        Ok(Self { hunks })
    }
}

fn parse_hunk_header(header: &str) -> Result<Hunk, CoreError> {
    // "-a,b +c,d @@"
    let body = header
        .strip_suffix(" @@")
        .ok_or_else(|| malformed("unterminated hunk header"))?;
    let (old, new) = body
        .split_once(' ')
        .ok_or_else(|| malformed("hunk header missing ranges"))?;
    let (old_start, old_len) = parse_range(old.strip_prefix('-'))?;
    let (new_start, new_len) = parse_range(new.strip_prefix('+'))?;
    if old_len > 0 && old_start == 0 {
        return Err(malformed("hunk old range starts at line 0"));
    }
    Ok(Hunk {
        old_start,
        old_len,
        new_start,
        new_len,
        lines: Vec::new(),
    })
}

fn parse_range(range: Option<&str>) -> Result<(usize, usize), CoreError> {
    let range = range.ok_or_else(|| malformed("hunk range missing sign"))?;
    let (start, len) = range
        .split_once(',')
        .ok_or_else(|| malformed("hunk range missing length"))?;
    let start = start
        .parse()
        .map_err(|_| malformed(&format!("bad hunk start '{start}'")))?;
    let len = len
        .parse()
        .map_err(|_| malformed(&format!("bad hunk length '{len}'")))?;
    Ok((start, len))
}

fn malformed(detail: &str) -> CoreError {
    CoreError::Validation(format!("Malformed patch: {detail}"))
}

// ---------------------------------------------------------------------------
// Diff
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Equal,
    Delete,
    Insert,
}

/// One step of the edit script. `old`/`new` are the number of old/new lines
/// consumed before this step.
#[derive(Debug, Clone, Copy)]
struct Edit {
    op: Op,
    old: usize,
    new: usize,
}

/// Split text into lines, each keeping its terminator.
fn split_lines(text: &str) -> Vec<&str> {
    text.split_inclusive('\n').collect()
}

/// Compute the line patch turning `old` into `new`.
pub fn diff_content(old: &str, new: &str) -> Patch {
    let a = split_lines(old);
    let b = split_lines(new);
    let edits = edit_script(&a, &b);
    Patch {
        hunks: build_hunks(&edits, &a, &b),
    }
}

/// Longest-common-subsequence edit script with the common prefix and suffix
/// stripped first.
fn edit_script(a: &[&str], b: &[&str]) -> Vec<Edit> {
    let prefix = a.iter().zip(b).take_while(|(x, y)| x == y).count();
    let suffix = a[prefix..]
        .iter()
        .rev()
        .zip(b[prefix..].iter().rev())
        .take_while(|(x, y)| x == y)
        .count();

    let mid_a = &a[prefix..a.len() - suffix];
    let mid_b = &b[prefix..b.len() - suffix];
    let (n, m) = (mid_a.len(), mid_b.len());

    // lcs[i * (m + 1) + j] = LCS length of mid_a[i..] and mid_b[j..]
    let width = m + 1;
    let mut lcs = vec![0u32; (n + 1) * width];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            lcs[i * width + j] = if mid_a[i] == mid_b[j] {
                lcs[(i + 1) * width + j + 1] + 1
            } else {
                lcs[(i + 1) * width + j].max(lcs[i * width + j + 1])
            };
        }
    }

    let mut edits = Vec::with_capacity(a.len() + b.len());
    for k in 0..prefix {
        edits.push(Edit {
            op: Op::Equal,
            old: k,
            new: k,
        });
    }

    let (mut i, mut j) = (0, 0);
    while i < n || j < m {
        let (old, new) = (prefix + i, prefix + j);
        if i < n && j < m && mid_a[i] == mid_b[j] {
            edits.push(Edit { op: Op::Equal, old, new });
            i += 1;
            j += 1;
        } else if j == m || (i < n && lcs[(i + 1) * width + j] >= lcs[i * width + j + 1]) {
            edits.push(Edit { op: Op::Delete, old, new });
            i += 1;
        } else {
            edits.push(Edit { op: Op::Insert, old, new });
            j += 1;
        }
    }

    for k in 0..suffix {
        edits.push(Edit {
            op: Op::Equal,
            old: a.len() - suffix + k,
            new: b.len() - suffix + k,
        });
    }
    edits
}

fn build_hunks(edits: &[Edit], a: &[&str], b: &[&str]) -> Vec<Hunk> {
    let is_change = |k: usize| edits[k].op != Op::Equal;
    let mut hunks = Vec::new();
    let mut cursor = 0;

    while let Some(first_change) = (cursor..edits.len()).find(|&k| is_change(k)) {
        let start = first_change.saturating_sub(CONTEXT_LINES).max(cursor);

        let mut end = first_change;
        let stop = loop {
            while end < edits.len() && is_change(end) {
                end += 1;
            }
            let next_change = (end..edits.len()).find(|&k| is_change(k));
            match next_change {
                Some(next) if next - end <= 2 * CONTEXT_LINES => end = next,
                _ => break (end + CONTEXT_LINES).min(edits.len()),
            }
        };

        let slice = &edits[start..stop];
        let lines: Vec<PatchLine> = slice
            .iter()
            .map(|e| match e.op {
                Op::Equal => PatchLine::Context(a[e.old].to_string()),
                Op::Delete => PatchLine::Removed(a[e.old].to_string()),
                Op::Insert => PatchLine::Added(b[e.new].to_string()),
            })
            .collect();
        let old_len = slice.iter().filter(|e| e.op != Op::Insert).count();
        let new_len = slice.iter().filter(|e| e.op != Op::Delete).count();
        let (old_pos, new_pos) = (slice[0].old, slice[0].new);

        hunks.push(Hunk {
            old_start: if old_len == 0 { old_pos } else { old_pos + 1 },
            old_len,
            new_start: if new_len == 0 { new_pos } else { new_pos + 1 },
            new_len,
            lines,
        });
        cursor = stop;
    }
    hunks
}

// ---------------------------------------------------------------------------
// Apply
// ---------------------------------------------------------------------------

/// Apply `patch` to `old`. Context and removed lines must match exactly.
pub fn apply_patch(old: &str, patch: &Patch) -> Result<String, CoreError> {
    let lines = split_lines(old);
    let mut out = String::with_capacity(old.len());
    let mut cursor = 0;

    for hunk in &patch.hunks {
        let start = hunk.old_index();
        if start < cursor || start > lines.len() {
            return Err(CoreError::Validation(format!(
                "Patch does not apply: hunk at line {} is out of order or past the end",
                hunk.old_start
            )));
        }
        for line in &lines[cursor..start] {
            out.push_str(line);
        }
        cursor = start;

        for line in &hunk.lines {
            match line {
                PatchLine::Added(text) => out.push_str(text),
                PatchLine::Context(text) | PatchLine::Removed(text) => {
                    if lines.get(cursor).copied() != Some(text.as_str()) {
                        return Err(CoreError::Validation(format!(
                            "Patch does not apply: line {} does not match",
                            cursor + 1
                        )));
                    }
                    if matches!(line, PatchLine::Context(_)) {
                        out.push_str(text);
                    }
                    cursor += 1;
                }
            }
        }
    }

    for line in &lines[cursor..] {
        out.push_str(line);
    }
    Ok(out)
}

/// Parse unified-diff text and apply it.
pub fn apply_patch_text(old: &str, patch: &str) -> Result<String, CoreError> {
    apply_patch(old, &patch.parse()?)
}

// ---------------------------------------------------------------------------
// Conflict detection
// ---------------------------------------------------------------------------

/// A contiguous run of changes in ancestor coordinates: old lines
/// `[start, end)` are replaced by `added`. A pure insertion has
/// `start == end`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ChangeRegion<'a> {
    start: usize,
    end: usize,
    added: Vec<&'a str>,
}

impl ChangeRegion<'_> {
    fn overlaps(&self, other: &ChangeRegion<'_>) -> bool {
        if self.start == self.end || other.start == other.end {
            self.start <= other.end && other.start <= self.end
        } else {
            self.start < other.end && other.start < self.end
        }
    }
}

fn change_regions(patch: &Patch) -> Vec<ChangeRegion<'_>> {
    let mut regions = Vec::new();
    for hunk in &patch.hunks {
        let mut cursor = hunk.old_index();
        let mut open: Option<ChangeRegion<'_>> = None;
        for line in &hunk.lines {
            match line {
                PatchLine::Context(_) => {
                    if let Some(region) = open.take() {
                        regions.push(region);
                    }
                    cursor += 1;
                }
                PatchLine::Removed(_) => {
                    let region = open.get_or_insert(ChangeRegion {
                        start: cursor,
                        end: cursor,
                        added: Vec::new(),
                    });
                    cursor += 1;
                    region.end = cursor;
                }
                PatchLine::Added(text) => {
                    open.get_or_insert(ChangeRegion {
                        start: cursor,
                        end: cursor,
                        added: Vec::new(),
                    })
                    .added
                    .push(text);
                }
            }
        }
        if let Some(region) = open {
            regions.push(region);
        }
    }
    regions
}

/// Ancestor line range (0-based, end-exclusive) where two patches collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConflictRange {
    pub start: usize,
    pub end: usize,
}

/// All places where `a` and `b`, both computed from the same ancestor,
/// change the same or adjacent lines differently.
pub fn conflicting_ranges(a: &Patch, b: &Patch) -> Vec<ConflictRange> {
    let regions_b = change_regions(b);
    let mut ranges = Vec::new();
    for ra in change_regions(a) {
        for rb in &regions_b {
            if ra.overlaps(rb) && ra != *rb {
                ranges.push(ConflictRange {
                    start: ra.start.min(rb.start),
                    end: ra.end.max(rb.end),
                });
            }
        }
    }
    ranges
}

/// True if the two patches cannot both be applied to their common ancestor
/// without one overwriting the other.
pub fn detect_conflict(a: &Patch, b: &Patch) -> bool {
    !conflicting_ranges(a, b).is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(old: &str, new: &str) {
        let patch = diff_content(old, new);
        assert_eq!(apply_patch(old, &patch).unwrap(), new, "direct apply");
        let text = patch.to_string();
        let parsed: Patch = text.parse().unwrap();
        assert_eq!(parsed, patch, "render/parse of:\n{text}");
        assert_eq!(apply_patch_text(old, &text).unwrap(), new, "text apply");
    }

    // -- diff_content / apply_patch -----------------------------------------

    #[test]
    fn single_line_edit_without_trailing_newline() {
        let patch = diff_content("Hello", "Hello world");
        assert_eq!(
            patch.to_string(),
            "@@ -1,1 +1,1 @@\n-Hello\n\\ No newline at end of file\n\
             +Hello world\n\\ No newline at end of file\n"
        );
        assert_eq!(
            patch.summary(),
            PatchSummary {
                lines_added: 1,
                lines_removed: 1
            }
        );
        roundtrip("Hello", "Hello world");
    }

    #[test]
    fn identical_text_gives_empty_patch() {
        let patch = diff_content("a\nb\n", "a\nb\n");
        assert!(patch.is_empty());
        assert_eq!(patch.to_string(), "");
        assert_eq!(apply_patch("a\nb\n", &patch).unwrap(), "a\nb\n");
    }

    #[test]
    fn roundtrips_assorted_edits() {
        roundtrip("", "fresh\ncontent\n");
        roundtrip("gone\n", "");
        roundtrip("a\nb\nc\n", "a\nc\n");
        roundtrip("a\nb", "a\nb\n");
        roundtrip("a\nb\n", "a\nb");
        roundtrip("line\r\nother\r\n", "line\r\nchanged\r\n");
        roundtrip("x\n\n\ny\n", "x\n\ny\n\n");
    }

    #[test]
    fn distant_changes_produce_separate_hunks() {
        let old: String = (1..=30).map(|i| format!("line {i}\n")).collect();
        let new = old
            .replace("line 2\n", "line two\n")
            .replace("line 28\n", "line twenty-eight\n");
        let patch = diff_content(&old, &new);
        assert_eq!(patch.hunks.len(), 2);
        assert_eq!(patch.hunks[0].old_start, 1);
        assert_eq!(patch.hunks[1].old_start, 25);
        roundtrip(&old, &new);
    }

    #[test]
    fn nearby_changes_share_a_hunk() {
        let old: String = (1..=12).map(|i| format!("{i}\n")).collect();
        let new = old.replace("3\n", "three\n").replace("7\n", "seven\n");
        let patch = diff_content(&old, &new);
        assert_eq!(patch.hunks.len(), 1);
        roundtrip(&old, &new);
    }

    #[test]
    fn apply_rejects_mismatched_context() {
        let patch = diff_content("a\nb\nc\n", "a\nB\nc\n");
        assert!(apply_patch("a\nx\nc\n", &patch).is_err());
    }

    // -- parsing ---------------------------------------------------------------

    #[test]
    fn parse_rejects_line_before_header() {
        assert!("+orphan\n".parse::<Patch>().is_err());
    }

    #[test]
    fn parse_rejects_wrong_counts() {
        assert!("@@ -1,2 +1,1 @@\n-a\n".parse::<Patch>().is_err());
    }

    #[test]
    fn parse_empty_is_empty_patch() {
        assert!("".parse::<Patch>().unwrap().is_empty());
    }

    // -- conflict detection ----------------------------------------------------

    #[test]
    fn same_line_changed_differently_conflicts() {
        let base = "Hello";
        let a = diff_content(base, "Hello there");
        let b = diff_content(base, "Hello world");
        assert!(detect_conflict(&a, &b));
        assert_eq!(conflicting_ranges(&a, &b), vec![ConflictRange { start: 0, end: 1 }]);
    }

    #[test]
    fn identical_changes_do_not_conflict() {
        let base = "one\ntwo\nthree\n";
        let a = diff_content(base, "one\n2\nthree\n");
        let b = diff_content(base, "one\n2\nthree\n");
        assert!(!detect_conflict(&a, &b));
    }

    #[test]
    fn disjoint_changes_do_not_conflict() {
        let base: String = (1..=20).map(|i| format!("{i}\n")).collect();
        let a = diff_content(&base, &base.replace("2\n", "two\n"));
        let b = diff_content(&base, &base.replace("18\n", "eighteen\n"));
        assert!(!detect_conflict(&a, &b));
    }

    #[test]
    fn adjacent_line_edits_do_not_conflict() {
        let base = "a\nb\nc\nd\n";
        let a = diff_content(base, "a\nB\nc\nd\n");
        let b = diff_content(base, "a\nb\nC\nd\n");
        assert!(!detect_conflict(&a, &b));
    }

    #[test]
    fn insertions_at_same_point_conflict() {
        let base = "a\nb\n";
        let a = diff_content(base, "a\nfrom a\nb\n");
        let b = diff_content(base, "a\nfrom b\nb\n");
        assert!(detect_conflict(&a, &b));
    }

    #[test]
    fn empty_patch_never_conflicts() {
        let a = diff_content("x\n", "y\n");
        assert!(!detect_conflict(&a, &Patch::default()));
        assert!(!detect_conflict(&Patch::default(), &a));
    }
}
