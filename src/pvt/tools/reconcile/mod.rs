//! Reconciliation of a PVT table with a survey table.
//!
//! Construction runs every stage eagerly: the survey is filtered to valid
//! session identifiers, PVT timestamps are normalised and duplicate sessions
//! collapsed, the two are inner-joined, both complements are derived, and the
//! joined table is serialised to a workbook. The result is a read-only
//! snapshot.

pub mod aggregate;
pub mod join;

use tracing::{debug, info, instrument};

use crate::pvt::tools::config::ExportConfig;
use crate::pvt::tools::error::{ReconcileError, Result};
use crate::pvt::tools::io::excel_write::{self, ExportArtifact};
use crate::pvt::tools::model::KeyedTable;

/// Columns of the joined table shown in the basic view.
pub const BASIC_COLUMNS: [&str; 5] = [
    "RecordedDate",
    "RecipientLastName",
    "RecipientFirstName",
    "RecipientEmail",
    "Finished",
];

/// Contact column identifying unmatched PVT records.
pub const PVT_CONTACT_COLUMN: &str = "contactID";
/// Contact column identifying unmatched survey records.
pub const SURVEY_CONTACT_COLUMN: &str = "ContactID";

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum ViewMode {
    #[default]
    Basic,
    Extended,
}

/// Outcome of reconciling one PVT table with one survey table.
#[derive(Debug, Clone)]
pub struct Reconciliation {
    validated_survey: KeyedTable,
    aggregated_pvt: KeyedTable,
    joined: KeyedTable,
    missing_from_survey_side: KeyedTable,
    missing_from_pvt_side: KeyedTable,
    export: ExportArtifact,
}

impl Reconciliation {
    /// Runs every reconciliation stage. Both tables must already be keyed by
    /// `sessionID`.
    #[instrument(
        level = "info",
        skip_all,
        fields(pvt_rows = pvt.len(), survey_rows = survey.len())
    )]
    pub fn new(mut pvt: KeyedTable, survey: KeyedTable, export: &ExportConfig) -> Result<Self> {
        if let Some(reason) = misalignment(&survey) {
            return Err(ReconcileError::survey(reason).into());
        }
        if let Some(reason) = misalignment(&pvt) {
            return Err(ReconcileError::pvt(reason).into());
        }

        let validated_survey = join::validate_survey(&survey)?;
        debug!(
            kept = validated_survey.len(),
            dropped = survey.len() - validated_survey.len(),
            "survey filtered by key prefix"
        );

        aggregate::normalize_datetimes(&mut pvt)?;
        let mut aggregated_pvt = aggregate::aggregate_by_key(&pvt)?;
        aggregate::format_datetimes(&mut aggregated_pvt);
        debug!(sessions = aggregated_pvt.len(), "PVT sessions aggregated");

        let join::JoinedTables {
            joined,
            survey_only: missing_from_survey_side,
            pvt_only: missing_from_pvt_side,
        } = join::inner_join(&validated_survey, &aggregated_pvt)?;
        let export = excel_write::export_table(&joined, export)
            .map_err(|error| ReconcileError::combine(error.to_string()))?;

        info!(
            joined = joined.len(),
            missing_from_survey_side = missing_from_survey_side.len(),
            missing_from_pvt_side = missing_from_pvt_side.len(),
            "tables reconciled"
        );

        Ok(Self {
            validated_survey,
            aggregated_pvt,
            joined,
            missing_from_survey_side,
            missing_from_pvt_side,
            export,
        })
    }

    pub fn joined(&self) -> &KeyedTable {
        &self.joined
    }

    pub fn validated_survey(&self) -> &KeyedTable {
        &self.validated_survey
    }

    /// PVT table with exactly one record per session.
    pub fn aggregated_pvt(&self) -> &KeyedTable {
        &self.aggregated_pvt
    }

    /// Survey records that found no PVT session.
    pub fn missing_from_survey_side(&self) -> &KeyedTable {
        &self.missing_from_survey_side
    }

    /// PVT sessions that found no survey record.
    pub fn missing_from_pvt_side(&self) -> &KeyedTable {
        &self.missing_from_pvt_side
    }

    /// Workbook serialised when the reconciliation was built.
    pub fn export(&self) -> &ExportArtifact {
        &self.export
    }

    /// Joined table restricted to the columns of the requested view.
    pub fn view(&self, mode: ViewMode) -> Result<KeyedTable> {
        match mode {
            ViewMode::Basic => self.joined.project(&BASIC_COLUMNS),
            ViewMode::Extended => Ok(self.joined.clone()),
        }
    }

    /// Contact identifiers of the unmatched records: PVT sessions lacking a
    /// survey, then survey records lacking a PVT session.
    pub fn unmatched_contacts(&self) -> Result<(KeyedTable, KeyedTable)> {
        let pvt = self.missing_from_pvt_side.project(&[PVT_CONTACT_COLUMN])?;
        let survey = self
            .missing_from_survey_side
            .project(&[SURVEY_CONTACT_COLUMN])?;
        Ok((pvt, survey))
    }
}

fn misalignment(table: &KeyedTable) -> Option<String> {
    table.misaligned_record().map(|(index, width)| {
        format!(
            "record {} has {width} values but the table has {} columns",
            index + 1,
            table.columns.len()
        )
    })
}
