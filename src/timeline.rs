use indicatif::ProgressBar;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::analysis::{Analysis, AnalysisRequest, Analyzer};
use crate::archive::{self, ArchiveSource};
use crate::extract;
use crate::quarters::{self, QuarterKey};

const UNKNOWN: &str = "Unknown";

/// Conditions that stop a timeline before any quarter is analysed.
#[derive(Debug, Error)]
pub enum TimelineError {
    #[error("Domain is required")]
    EmptyDomain,
    #[error("no snapshots found for {0}")]
    NoSnapshots(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct TimelineEntry {
    pub quarter: QuarterKey,
    pub timestamp: String,
    pub date: String,
    pub url: String,
    pub analysis: Analysis,
}

#[derive(Debug, Clone, Serialize)]
pub struct Timeline {
    pub domain: String,
    pub start_date: String,
    pub distribution_channels: String,
    /// Quarters with at least one capture, including ones whose page could not be fetched.
    pub total_quarters: usize,
    pub timeline: Vec<TimelineEntry>,
}

/// Build the quarter-by-quarter timeline for `input`.
///
/// Runs strictly sequentially. A quarter whose page fetch fails is left out; only an empty
/// index is fatal.
pub async fn build_timeline<A, M>(
    archive: &A,
    analyzer: &M,
    input: &str,
    progress: &ProgressBar,
) -> Result<Timeline, TimelineError>
where
    A: ArchiveSource + ?Sized,
    M: Analyzer + ?Sized,
{
    let domain = archive::normalize_domain(input);
    if domain.is_empty() {
        return Err(TimelineError::EmptyDomain);
    }
    info!("Analyzing domain: {}", domain);

    let snapshots = archive::collect_snapshots(archive, &domain).await;
    if snapshots.is_empty() {
        return Err(TimelineError::NoSnapshots(domain));
    }

    let unique = quarters::dedup_by_timestamp(snapshots);
    info!("Found {} unique snapshots", unique.len());

    let quarterly = quarters::bucket_by_quarter(&unique);
    info!("Organized into {} quarters", quarterly.len());

    // bucket_by_quarter never returns an empty map for non-empty input
    let start_date = quarterly
        .values()
        .next()
        .map(|s| s.date.clone())
        .unwrap_or_default();

    progress.set_length(quarterly.len() as u64);

    let mut entries = Vec::with_capacity(quarterly.len());
    let mut first_analysis: Option<Analysis> = None;

    for (i, (quarter, snapshot)) in quarterly.iter().enumerate() {
        progress.set_message(quarter.to_string());
        info!("Analyzing {}: {}", quarter, snapshot.timestamp);

        let html = match archive.fetch_page(&snapshot.url, &snapshot.timestamp).await {
            Ok(html) => html,
            Err(e) => {
                warn!("Failed to fetch {} ({}): {}", quarter, snapshot.timestamp, e);
                progress.inc(1);
                continue;
            }
        };

        let content = extract::extract_digest(&html);
        let is_first = i == 0;
        let analysis = analyzer
            .analyze(&AnalysisRequest {
                content: &content,
                date: &snapshot.date,
                quarter,
                is_first,
            })
            .await;

        if is_first {
            first_analysis = Some(analysis.clone());
        }

        entries.push(TimelineEntry {
            quarter: quarter.clone(),
            timestamp: snapshot.timestamp.clone(),
            date: snapshot.date.clone(),
            url: snapshot.url.clone(),
            analysis,
        });
        progress.inc(1);
    }

    let distribution_channels = first_analysis
        .as_ref()
        .and_then(Analysis::distribution_channels)
        .unwrap_or(UNKNOWN)
        .to_string();

    Ok(Timeline {
        domain,
        start_date,
        distribution_channels,
        total_quarters: quarterly.len(),
        timeline: entries,
    })
}
