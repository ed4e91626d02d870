//! `datakube archive-from-file` command implementation

use datakube_orchestrator::archive::{Archiver, LocationReport};
use std::path::Path;
use tracing::info;

use crate::error::{CliError, Result};

/// Location URIs for each non-empty line of `path`, joined onto `location_prefix`
pub async fn read_locations(path: &Path, location_prefix: &str) -> Result<Vec<String>> {
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(CliError::FileNotFound(path.display().to_string()));
        },
        Err(e) => return Err(e.into()),
    };

    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|key| format!("{}{}", location_prefix, key))
        .collect())
}

/// Archive every dataset indexed at the locations listed in `path`
pub async fn run(archiver: &Archiver, path: &Path, location_prefix: &str) -> Result<LocationReport> {
    let locations = read_locations(path, location_prefix).await?;
    info!(count = locations.len(), file = %path.display(), "Archiving datasets by location");

    let report = archiver.archive_locations(locations).await;
    info!(
        locations = report.locations,
        archived = report.archived,
        failed = report.failed,
        "Archive from file complete"
    );

    Ok(report)
}
