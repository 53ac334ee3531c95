use std::path::Path;

use tracing::{info, instrument, warn};

use crate::pvt::tools::config::ToolConfig;
use crate::pvt::tools::error::{Result, ToolError};
use crate::pvt::tools::io::csv_write;
use crate::pvt::tools::io::{FileTableSource, LoadedPair, TableFormat, TableSource, load_pair};
use crate::pvt::tools::reconcile::Reconciliation;
use crate::pvt::tools::session::SessionAuthenticator;

/// Result of one reconciliation request.
#[derive(Debug)]
pub enum ReconcileOutcome {
    Reconciled(Box<Reconciliation>),
    /// An input was unusable; the warning is meant for the end user.
    Skipped { warning: String },
}

/// Loads both sources and reconciles them for a logged-in user.
#[instrument(
    level = "info",
    skip_all,
    fields(pvt = %pvt.describe(), survey = %survey.describe())
)]
pub fn reconcile_sources(
    pvt: &dyn TableSource,
    survey: &dyn TableSource,
    session: &dyn SessionAuthenticator,
    config: &ToolConfig,
) -> Result<ReconcileOutcome> {
    if !session.is_logged_in() {
        return Err(ToolError::Unauthenticated);
    }

    let (pvt, survey) = match load_pair(pvt, survey)? {
        LoadedPair::Ready { pvt, survey } => (pvt, survey),
        LoadedPair::Skipped { warning } => {
            warn!(%warning, "reconciliation skipped");
            return Ok(ReconcileOutcome::Skipped { warning });
        }
    };
    info!(
        pvt_rows = pvt.len(),
        survey_rows = survey.len(),
        "inputs keyed"
    );

    let reconciliation = Reconciliation::new(pvt, survey, &config.export)?;
    Ok(ReconcileOutcome::Reconciled(Box::new(reconciliation)))
}

/// Writes the joined table to `output`: CSV when the path ends in `.csv`,
/// otherwise the exported workbook.
pub fn save_output(reconciliation: &Reconciliation, output: &Path) -> Result<()> {
    match TableFormat::from_path(output) {
        Ok(TableFormat::Csv) => csv_write::export_csv(reconciliation.joined(), output)?,
        _ => reconciliation.export().save(output)?,
    }
    info!(output = %output.display(), rows = reconciliation.joined().len(), "combined table written");
    Ok(())
}

/// Reconciles two files and writes the joined table to `output`.
#[instrument(
    level = "info",
    skip_all,
    fields(pvt = %pvt.display(), survey = %survey.display(), output = %output.display())
)]
pub fn reconcile_files(
    pvt: &Path,
    survey: &Path,
    output: &Path,
    session: &dyn SessionAuthenticator,
    config: &ToolConfig,
) -> Result<ReconcileOutcome> {
    let pvt = FileTableSource::new(pvt)?;
    let survey = FileTableSource::new(survey)?;
    let outcome = reconcile_sources(&pvt, &survey, session, config)?;
    if let ReconcileOutcome::Reconciled(reconciliation) = &outcome {
        save_output(reconciliation, output)?;
    }
    Ok(outcome)
}
