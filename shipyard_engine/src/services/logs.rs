//! Display-side log processing: noise filtering and truncation.
//!
//! Everything here is lossy and for display only. The canonical `logs`
//! field on a build record is never filtered or truncated.

use std::sync::LazyLock;

use regex::RegexSet;

/// Lines matching any of these are always kept, whatever else they match.
static KEEP_PATTERNS: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"(?i)error:",
        r"(?i)warning:",
        r"(?i)failed",
        r"(?i)succeeded",
        r"(?i)building",
        r"(?i)archive",
        r"(?i)export",
        "📦|🚀|✅|❌|🔧|📤",
        r"\*\* BUILD",
        r"\*\* ARCHIVE",
        r"\*\* EXPORT",
    ])
    .unwrap()
});

/// Known toolchain noise: shell plumbing, linker chatter, packaging
/// housekeeping.
static SKIP_PATTERNS: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"^\s*$",
        r"Ld ",
        r"^\s*cd ",
        r"^\s*export ",
        r"^\s*/usr/bin/",
        r"^\s*builtin-",
        r"ProcessInfoPlistFile",
        r"ProcessProductPackaging",
        r"^\s*write-file",
        r"^\s*chmod",
        r"CompileAssetCatalog",
    ])
    .unwrap()
});

/// Drops verbose toolchain noise line by line. Keep patterns win over skip
/// patterns; lines matching neither set pass through.
pub fn filter_verbose_logs(logs: &str) -> String {
    logs.split('\n')
        .filter(|line| KEEP_PATTERNS.is_match(line) || !SKIP_PATTERNS.is_match(line))
        .collect::<Vec<_>>()
        .join("\n")
}

/// A display window over a log buffer: the last lines of it, plus the
/// bookkeeping for an "N earlier lines hidden" indicator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogWindow {
    pub display_logs: String,
    pub hidden_count: usize,
    pub total_lines: usize,
}

/// Limits logs to the last `max_lines` lines, verbatim. Input with at most
/// `max_lines` lines is returned unchanged with `hidden_count = 0`.
pub fn limit_log_lines(logs: &str, max_lines: usize) -> LogWindow {
    let lines: Vec<&str> = logs.split('\n').collect();
    let total_lines = lines.len();

    if total_lines <= max_lines {
        return LogWindow {
            display_logs: logs.to_string(),
            hidden_count: 0,
            total_lines,
        };
    }

    let hidden_count = total_lines - max_lines;
    LogWindow {
        display_logs: lines[hidden_count..].join("\n"),
        hidden_count,
        total_lines,
    }
}

/// Filter, then limit. The only entry point display adapters should use.
pub fn process_logs_for_display(logs: &str, max_lines: usize) -> LogWindow {
    limit_log_lines(&filter_verbose_logs(logs), max_lines)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_drops_known_noise() {
        let logs = "Compiling main.swift\n\n    cd /tmp/app\n/usr/bin/touch marker\nchmod +x gradlew\nLd /tmp/app.o normal\nLinking done";
        let filtered = filter_verbose_logs(logs);
        assert_eq!(filtered, "Compiling main.swift\nLinking done");
    }

    #[test]
    fn filter_keeps_unclassified_lines() {
        let logs = "some ordinary progress line";
        assert_eq!(filter_verbose_logs(logs), logs);
    }

    #[test]
    fn keep_patterns_win_over_skip_patterns() {
        // Matches the skip rule for shell `export` lines and the keep rule
        // for export banners; must be kept.
        let line = "    export PATH=/opt/homebrew/bin";
        assert_eq!(filter_verbose_logs(line), line);

        // Whitespace-only lines match no keep rule and are dropped.
        assert_eq!(filter_verbose_logs("   \nerror: boom"), "error: boom");
    }

    #[test]
    fn filter_keeps_status_banners_and_markers() {
        let logs = "** BUILD SUCCEEDED **\n✅ Export completed\nwarning: deprecated API";
        assert_eq!(filter_verbose_logs(logs), logs);
    }

    #[test]
    fn limit_is_identity_when_under_the_cap() {
        let logs = "one\ntwo\nthree";
        let window = limit_log_lines(logs, 5);
        assert_eq!(window.display_logs, logs);
        assert_eq!(window.hidden_count, 0);
        assert_eq!(window.total_lines, 3);
    }

    #[test]
    fn limit_keeps_the_last_lines_verbatim() {
        let lines: Vec<String> = (1..=500).map(|i| format!("line {i}")).collect();
        let logs = lines.join("\n");

        let window = limit_log_lines(&logs, 150);
        assert_eq!(window.hidden_count, 350);
        assert_eq!(window.total_lines, 500);
        assert_eq!(window.display_logs, lines[350..].join("\n"));
        assert!(window.display_logs.starts_with("line 351\n"));
        assert!(window.display_logs.ends_with("line 500"));
    }

    #[test]
    fn process_filters_before_limiting() {
        // Two noise lines between payload lines: the cap applies to the
        // filtered output, not the raw input.
        let logs = "first\n\n\nsecond\nthird";
        let window = process_logs_for_display(logs, 2);
        assert_eq!(window.display_logs, "second\nthird");
        assert_eq!(window.hidden_count, 1);
        assert_eq!(window.total_lines, 3);
    }
}
