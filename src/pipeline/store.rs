//! Report Store
//!
//! One JSON document per session under the reports directory, named
//! `<session_id>.json`, plus an aggregate `stats.json`.
//!
//! Reports are written through a temp file and renamed into place, so a
//! reader never observes a half-written report.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::report::SessionReport;
use crate::config::Config;
use crate::constants::reports::STATS_FILE;
use crate::types::{Result, ScoutError, SessionId, SeverityCounts};

/// Aggregate over every completed report
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportStats {
    #[serde(default)]
    pub total_vulnerabilities: usize,
    #[serde(default)]
    pub total_reports: usize,
    #[serde(default)]
    pub total_patches: usize,
    #[serde(default)]
    pub by_severity: SeverityCounts,
}

impl ReportStats {
    fn absorb(&mut self, report: &SessionReport) {
        let vulns = match &report.summary {
            Some(summary) => summary.total_vulnerabilities(),
            None => report.vulnerabilities.len(),
        };
        self.total_reports += 1;
        self.total_vulnerabilities += vulns;
        self.total_patches += report.patches.len();
        self.by_severity.merge(&report.severity_counts());
    }
}

/// Listing entry for `reports list`
#[derive(Debug, Clone)]
pub struct StoredReport {
    pub session_id: String,
    pub path: PathBuf,
    pub modified: Option<std::time::SystemTime>,
}

pub struct ReportStore {
    dir: PathBuf,
    stats_lock: Mutex<()>,
}

impl ReportStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            stats_lock: Mutex::new(()),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.reports.dir.clone())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn report_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    fn stats_path(&self) -> PathBuf {
        self.dir.join(STATS_FILE)
    }

    async fn write_atomic(&self, path: &Path, content: &str) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content).await?;
        if let Err(e) = tokio::fs::rename(&tmp, path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    /// Persist a report; returns the written path
    pub async fn save(&self, report: &SessionReport) -> Result<PathBuf> {
        report.session_id.validate()?;
        let path = self.report_path(report.session_id.as_str());
        let content = serde_json::to_string_pretty(report)?;
        self.write_atomic(&path, &content).await?;

        info!(
            session = %report.session_id,
            status = %report.status,
            "Saved report to {}",
            path.display()
        );
        Ok(path)
    }

    pub async fn get(&self, id: &str) -> Result<SessionReport> {
        SessionId::new(id).validate()?;
        let path = self.report_path(id);

        match tokio::fs::read_to_string(&path).await {
            Ok(content) => serde_json::from_str(&content)
                .map_err(|e| ScoutError::Report(format!("Corrupt report '{}': {}", id, e))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ScoutError::Report(format!("Report not found: {}", id)))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Report files, newest first
    pub async fn list(&self) -> Result<Vec<StoredReport>> {
        let mut reports = Vec::new();

        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(reports),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !path.extension().is_some_and(|e| e == "json") {
                continue;
            }
            if path.file_name().is_some_and(|n| n == STATS_FILE) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let modified = entry.metadata().await.ok().and_then(|m| m.modified().ok());
            reports.push(StoredReport {
                session_id: stem.to_string(),
                path,
                modified,
            });
        }

        reports.sort_by(|a, b| {
            b.modified
                .cmp(&a.modified)
                .then_with(|| b.session_id.cmp(&a.session_id))
        });
        Ok(reports)
    }

    /// Aggregate stats; all zero before the first completed run
    pub async fn stats(&self) -> Result<ReportStats> {
        match tokio::fs::read_to_string(self.stats_path()).await {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ReportStats::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Fold a finished report into the aggregate. Non-completed reports are
    /// ignored.
    pub async fn record_completed(&self, report: &SessionReport) -> Result<ReportStats> {
        let _guard = self.stats_lock.lock().await;
        let mut stats = self.stats().await?;
        if !report.is_completed() {
            return Ok(stats);
        }

        stats.absorb(report);
        let content = serde_json::to_string_pretty(&stats)?;
        self.write_atomic(&self.stats_path(), &content).await?;
        debug!(session = %report.session_id, total = stats.total_reports, "Updated report stats");
        Ok(stats)
    }

    /// Recompute the aggregate from every report on disk
    pub async fn rebuild_stats(&self) -> Result<ReportStats> {
        let _guard = self.stats_lock.lock().await;
        let mut stats = ReportStats::default();

        for stored in self.list().await? {
            let content = match tokio::fs::read_to_string(&stored.path).await {
                Ok(c) => c,
                Err(e) => {
                    warn!("Skipping unreadable report {}: {}", stored.path.display(), e);
                    continue;
                }
            };
            match serde_json::from_str::<SessionReport>(&content) {
                Ok(report) if report.is_completed() => stats.absorb(&report),
                Ok(_) => {}
                Err(e) => warn!("Skipping malformed report {}: {}", stored.path.display(), e),
            }
        }

        let content = serde_json::to_string_pretty(&stats)?;
        self.write_atomic(&self.stats_path(), &content).await?;
        info!("Rebuilt stats from {} reports", stats.total_reports);
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::testing::sample_vuln;
    use crate::pipeline::report::{AnalysisKind, ReportSummary};
    use crate::types::Severity;
    use tempfile::TempDir;

    fn completed(id: &str, severities: &[Severity]) -> SessionReport {
        let mut report = SessionReport::new(SessionId::new(id), AnalysisKind::Code);
        report.vulnerabilities = severities
            .iter()
            .enumerate()
            .map(|(i, s)| sample_vuln(&format!("v{}", i), *s))
            .collect();
        report.complete(ReportSummary::Analysis(report.analysis_summary()));
        report
    }

    #[tokio::test]
    async fn test_save_then_get() {
        let dir = TempDir::new().unwrap();
        let store = ReportStore::new(dir.path());
        let report = completed("session_1", &[Severity::High]);

        let path = store.save(&report).await.unwrap();
        assert!(path.ends_with("session_1.json"));
        assert!(!dir.path().join("session_1.json.tmp").exists());

        let loaded = store.get("session_1").await.unwrap();
        assert_eq!(loaded, report);
    }

    #[tokio::test]
    async fn test_missing_report_is_report_error() {
        let dir = TempDir::new().unwrap();
        let store = ReportStore::new(dir.path());
        let err = store.get("nope").await.unwrap_err();
        assert!(matches!(err, ScoutError::Report(ref m) if m.contains("not found")));
    }

    #[tokio::test]
    async fn test_get_rejects_path_traversal() {
        let dir = TempDir::new().unwrap();
        let store = ReportStore::new(dir.path());
        assert!(matches!(
            store.get("../secrets").await,
            Err(ScoutError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_list_excludes_stats_file() {
        let dir = TempDir::new().unwrap();
        let store = ReportStore::new(dir.path());
        assert!(store.list().await.unwrap().is_empty());

        let a = completed("a", &[]);
        store.save(&a).await.unwrap();
        store.record_completed(&a).await.unwrap();
        store.save(&completed("b", &[])).await.unwrap();

        let ids: Vec<String> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.session_id)
            .collect();
        assert_eq!(ids.len(), 2);
        assert!(!ids.iter().any(|id| id == "stats"));
    }

    #[tokio::test]
    async fn test_report_cannot_overwrite_stats_file() {
        let dir = TempDir::new().unwrap();
        let store = ReportStore::new(dir.path());
        let first = completed("first", &[Severity::High]);
        store.save(&first).await.unwrap();
        let before = store.record_completed(&first).await.unwrap();

        let clash = completed("stats", &[Severity::Critical]);
        assert!(matches!(
            store.save(&clash).await,
            Err(ScoutError::Validation(_))
        ));
        assert!(matches!(
            store.get("stats").await,
            Err(ScoutError::Validation(_))
        ));

        assert_eq!(store.stats().await.unwrap(), before);
        let ids: Vec<String> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.session_id)
            .collect();
        assert_eq!(ids, vec!["first".to_string()]);
    }

    #[tokio::test]
    async fn test_only_completed_reports_count() {
        let dir = TempDir::new().unwrap();
        let store = ReportStore::new(dir.path());
        assert_eq!(store.stats().await.unwrap(), ReportStats::default());

        store
            .record_completed(&completed("ok", &[Severity::Critical, Severity::Low]))
            .await
            .unwrap();

        let mut failed = SessionReport::new(SessionId::new("bad"), AnalysisKind::File);
        failed.vulnerabilities = vec![sample_vuln("x", Severity::High)];
        failed.fail("boom");
        let stats = store.record_completed(&failed).await.unwrap();

        assert_eq!(stats.total_reports, 1);
        assert_eq!(stats.total_vulnerabilities, 2);
        assert_eq!(stats.by_severity.critical, 1);
        assert_eq!(stats.by_severity.high, 0);
    }

    #[tokio::test]
    async fn test_rebuild_skips_failed_and_malformed() {
        let dir = TempDir::new().unwrap();
        let store = ReportStore::new(dir.path());

        store.save(&completed("one", &[Severity::Medium])).await.unwrap();
        store.save(&completed("two", &[Severity::High, Severity::High])).await.unwrap();
        let mut failed = SessionReport::new(SessionId::new("three"), AnalysisKind::Code);
        failed.fail("boom");
        store.save(&failed).await.unwrap();
        std::fs::write(dir.path().join("garbage.json"), "{not json").unwrap();

        let stats = store.rebuild_stats().await.unwrap();
        assert_eq!(stats.total_reports, 2);
        assert_eq!(stats.total_vulnerabilities, 3);
        assert_eq!(stats.by_severity.high, 2);
        assert_eq!(store.stats().await.unwrap(), stats);
    }
}
