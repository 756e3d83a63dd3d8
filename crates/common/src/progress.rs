//! Progress header rendering
//!
//! Pure functions: the tracker in `testrelay-reporter` owns the counters and
//! the chat edits, this module only turns counters into text.

use crate::types::ProgressCounters;

/// Number of segments in the progress bar
pub const BAR_SEGMENTS: u32 = 8;

const FILLED: char = '▰';
const EMPTY: char = '▱';

/// Whole percentage complete, 0 when nothing is planned
pub fn percent(completed: u32, total: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    let pct = (u64::from(completed) * 100) / u64::from(total);
    pct.min(100) as u32
}

/// Filled segments for `percent`, always within `[0, segments]`
pub fn filled_segments(percent: u32, segments: u32) -> u32 {
    let filled = (f64::from(percent) / 100.0 * f64::from(segments)).round();
    filled.clamp(0.0, f64::from(segments)) as u32
}

/// Bar such as `▰▰▰▱▱▱▱▱`
pub fn render_bar(percent: u32) -> String {
    let filled = filled_segments(percent, BAR_SEGMENTS);
    let mut bar = String::with_capacity(BAR_SEGMENTS as usize * FILLED.len_utf8());
    bar.extend(std::iter::repeat(FILLED).take(filled as usize));
    bar.extend(std::iter::repeat(EMPTY).take((BAR_SEGMENTS - filled) as usize));
    bar
}

fn summary_block(passed: u32, failed: u32, skipped: u32) -> String {
    format!(
        "📊 Test Summary\n✅ Passed: {}\n❌ Failed: {}\n⚪ Skipped: {}",
        passed, failed, skipped
    )
}

/// Header shown while tests are still running
pub fn render_running_header(suite_label: &str, counters: &ProgressCounters) -> String {
    let pct = percent(counters.completed, counters.total);
    format!(
        "{}\nTests are running {} {}% [{}/{}]\n\n{}",
        suite_label,
        render_bar(pct),
        pct,
        counters.completed,
        counters.total,
        summary_block(counters.passed, counters.failed, counters.skipped)
    )
}

/// Header shown once the run is over
pub fn render_final_summary(suite_label: &str, counters: &ProgressCounters) -> String {
    let total = counters.passed + counters.failed + counters.skipped;
    format!(
        "{}\nTests completed ✅ 100% [{}/{}]\n\n{}",
        suite_label,
        total,
        total,
        summary_block(counters.passed, counters.failed, counters.skipped)
    )
}

/// Embed description linking the published HTML report
pub fn report_link(report_url: &str) -> String {
    format!("🔗 [Playwright HTML report is here]({})", report_url)
}
