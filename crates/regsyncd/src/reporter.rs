//! Stat reporter that writes each batch as a table to the log.

use async_trait::async_trait;
use chrono::{DateTime, Local};
use regsync_core::{ReportHandler, SyncResult};
use regsync_types::{ReportTarget, StatInfo, TargetType};
use std::fmt::Write as _;
use tracing::info;

/// Tracing target of rendered stat tables.
pub const STAT_TARGET: &str = "regsync::stat";

const EMPTY_BATCH: &str = "No API Call";

#[derive(Debug, Default)]
pub struct FileReportHandler;

impl FileReportHandler {
    pub fn new() -> Self {
        Self
    }
}

fn row(out: &mut String, cells: [&str; 5]) {
    // Writing to a String cannot fail.
    let _ = writeln!(
        out,
        "{:<48}|{:>12}|{:>12}|{:>12}|{:>12}|",
        cells[0], cells[1], cells[2], cells[3], cells[4]
    );
}

/// Renders one batch: a timestamp line, a header and one row per dimension.
pub fn render(stat: &StatInfo, now: DateTime<Local>) -> String {
    let mut out = format!("{}\n", now.format("%Y-%m-%d %H:%M:%S"));
    if stat.is_empty() {
        out.push_str(EMPTY_BATCH);
        out.push('\n');
        return out;
    }
    row(&mut out, ["Name", "Type", "Detail", "Total", "Error"]);
    for record in &stat.records {
        row(
            &mut out,
            [
                record.dimension.name.as_str(),
                record.dimension.resource_type.as_str(),
                record.dimension.product_name.as_str(),
                record.total.to_string().as_str(),
                record.errors.to_string().as_str(),
            ],
        );
    }
    out
}

#[async_trait]
impl ReportHandler for FileReportHandler {
    fn target_type(&self) -> TargetType {
        TargetType::File
    }

    async fn init(&mut self, target: &ReportTarget) -> SyncResult<()> {
        info!(options = target.options.len(), "file stat reporter enabled");
        Ok(())
    }

    async fn report_stat(&self, stat: &StatInfo) {
        info!(target: STAT_TARGET, "\n{}", render(stat, Local::now()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use regsync_types::{Dimension, HealthRecord, ResourceType};

    fn at() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 3, 1, 12, 30, 0).unwrap()
    }

    #[test]
    fn test_render_empty_batch() {
        let text = render(&StatInfo::default(), at());
        assert_eq!(text, "2026-03-01 12:30:00\nNo API Call\n");
    }

    #[test]
    fn test_render_rows_are_fixed_width() {
        let stat = StatInfo {
            records: vec![HealthRecord {
                dimension: Dimension::new("nacos-a", ResourceType::Nacos, "nacos-2.x"),
                total: 12,
                errors: 1,
            }],
        };
        let text = render(&stat, at());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("Name "));
        assert_eq!(lines[2].len(), 49 + 4 * 13);
        assert!(lines[2].starts_with("nacos-a "));
        assert!(lines[2].ends_with("          12|           1|"));
    }
}
