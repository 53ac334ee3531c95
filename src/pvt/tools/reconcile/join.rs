use std::collections::{HashMap, HashSet};

use crate::pvt::tools::error::ReconcileError;
use crate::pvt::tools::model::{CellValue, KeyedRecord, KeyedTable};

/// Prefix every valid survey session identifier carries.
pub const SURVEY_KEY_PREFIX: &str = "FS_";

/// Suffix appended to PVT columns whose name is already used by the survey.
pub const PVT_COLLISION_SUFFIX: &str = "_pvt";

/// Keeps only survey records whose key starts with [`SURVEY_KEY_PREFIX`].
/// Every key must be text.
pub fn validate_survey(survey: &KeyedTable) -> Result<KeyedTable, ReconcileError> {
    let mut validated = KeyedTable::new(survey.key_column.clone(), survey.columns.clone());
    for (index, record) in survey.records.iter().enumerate() {
        let key = record.key.as_text().ok_or_else(|| {
            ReconcileError::survey(format!(
                "key of record {} is {}, expected text",
                index + 1,
                record.key.kind_name()
            ))
        })?;
        if key.starts_with(SURVEY_KEY_PREFIX) {
            validated.records.push(record.clone());
        }
    }
    Ok(validated)
}

/// Key text with any survey prefix removed, so `S1` and `FS_S1` name the
/// same session.
pub fn match_key(key: &CellValue) -> String {
    let text = key.to_string();
    match text.strip_prefix(SURVEY_KEY_PREFIX) {
        Some(stripped) => stripped.to_string(),
        None => text,
    }
}

/// Output of [`inner_join`]: the joined table and the records of each side
/// that found no partner.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedTables {
    pub joined: KeyedTable,
    /// Survey records without a PVT session.
    pub survey_only: KeyedTable,
    /// PVT sessions without a survey record.
    pub pvt_only: KeyedTable,
}

/// Aggregated PVT records indexed by their exact key text.
struct PvtIndex<'a> {
    records: HashMap<String, &'a KeyedRecord>,
}

impl<'a> PvtIndex<'a> {
    fn build(pvt: &'a KeyedTable) -> Result<Self, ReconcileError> {
        let mut records = HashMap::with_capacity(pvt.len());
        for record in &pvt.records {
            if records.insert(record.key.to_string(), record).is_some() {
                return Err(ReconcileError::combine(format!(
                    "PVT key '{}' is not unique",
                    record.key
                )));
            }
        }
        Ok(Self { records })
    }

    /// Finds the PVT session for a survey key: an exact key match first,
    /// then the key with the survey prefix removed.
    fn lookup(&self, survey_key: &CellValue) -> Option<&'a KeyedRecord> {
        let text = survey_key.to_string();
        self.records
            .get(&text)
            .or_else(|| {
                text.strip_prefix(SURVEY_KEY_PREFIX)
                    .and_then(|stripped| self.records.get(stripped))
            })
            .copied()
    }
}

/// Inner-joins the survey with the aggregated PVT table and splits off the
/// unmatched records of both sides.
///
/// Rows follow survey order and carry the PVT key. Columns are the survey's,
/// followed by the PVT's; a PVT column whose name the survey already uses
/// gets [`PVT_COLLISION_SUFFIX`].
pub fn inner_join(survey: &KeyedTable, pvt: &KeyedTable) -> Result<JoinedTables, ReconcileError> {
    if survey.key_column != pvt.key_column {
        return Err(ReconcileError::combine(format!(
            "key columns differ: '{}' and '{}'",
            survey.key_column, pvt.key_column
        )));
    }

    let index = PvtIndex::build(pvt)?;
    let columns = joined_columns(survey, pvt)?;
    let mut joined = KeyedTable::new(survey.key_column.clone(), columns);
    let mut survey_only = KeyedTable::new(survey.key_column.clone(), survey.columns.clone());
    let mut matched: HashSet<String> = HashSet::new();

    for record in &survey.records {
        let Some(pvt_record) = index.lookup(&record.key) else {
            survey_only.records.push(record.clone());
            continue;
        };
        matched.insert(pvt_record.key.to_string());
        let mut values = Vec::with_capacity(joined.columns.len());
        values.extend(record.values.iter().cloned());
        values.extend(pvt_record.values.iter().cloned());
        joined.records.push(KeyedRecord {
            key: pvt_record.key.clone(),
            values,
        });
    }

    let mut pvt_only = KeyedTable::new(pvt.key_column.clone(), pvt.columns.clone());
    pvt_only.records = pvt
        .records
        .iter()
        .filter(|record| !matched.contains(&record.key.to_string()))
        .cloned()
        .collect();

    Ok(JoinedTables {
        joined,
        survey_only,
        pvt_only,
    })
}

fn joined_columns(survey: &KeyedTable, pvt: &KeyedTable) -> Result<Vec<String>, ReconcileError> {
    let mut columns = survey.columns.clone();
    let mut seen: HashSet<String> = HashSet::with_capacity(survey.columns.len() + pvt.columns.len());
    seen.insert(survey.key_column.clone());

    for column in &survey.columns {
        if !seen.insert(column.clone()) {
            return Err(ReconcileError::combine(format!(
                "survey column '{column}' appears twice"
            )));
        }
    }

    for column in &pvt.columns {
        let name = if seen.contains(column) {
            format!("{column}{PVT_COLLISION_SUFFIX}")
        } else {
            column.clone()
        };
        if !seen.insert(name.clone()) {
            return Err(ReconcileError::combine(format!(
                "column '{name}' appears on both sides"
            )));
        }
        columns.push(name);
    }

    Ok(columns)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(columns: &[&str], rows: &[(&str, &[&str])]) -> KeyedTable {
        let mut table = KeyedTable::new(
            "sessionID",
            columns.iter().map(|column| column.to_string()).collect(),
        );
        for (key, values) in rows {
            table.records.push(KeyedRecord {
                key: CellValue::text(*key),
                values: values.iter().map(|value| CellValue::text(*value)).collect(),
            });
        }
        table
    }

    #[test]
    fn survey_keys_need_the_prefix() {
        let survey = table(&["Name"], &[("FS_1", &["A"]), ("XX_2", &["B"]), ("FS_3", &["C"])]);
        let validated = validate_survey(&survey).expect("validated");
        let keys: Vec<String> = validated.keys().map(|key| key.to_string()).collect();
        assert_eq!(keys, vec!["FS_1", "FS_3"]);
    }

    #[test]
    fn non_text_survey_keys_are_invalid() {
        let mut survey = table(&["Name"], &[("FS_1", &["A"])]);
        survey.records[0].key = CellValue::Number(12.0);
        let error = validate_survey(&survey).expect_err("numeric key rejected");
        assert!(matches!(error, ReconcileError::InvalidSurveyFormat { .. }));
    }

    #[test]
    fn match_key_strips_the_survey_prefix() {
        assert_eq!(match_key(&CellValue::text("FS_S1")), "S1");
        assert_eq!(match_key(&CellValue::text("S1")), "S1");
        assert_eq!(match_key(&CellValue::Number(7.0)), "7");
    }

    #[test]
    fn join_renames_colliding_pvt_columns() {
        let survey = table(&["Name", "score"], &[("FS_1", &["A", "survey"])]);
        let pvt = table(&["score"], &[("FS_1", &["pvt"])]);

        let joined = inner_join(&survey, &pvt).expect("joined").joined;
        assert_eq!(joined.columns, vec!["Name", "score", "score_pvt"]);
        assert_eq!(
            joined.records[0].values,
            vec![CellValue::text("A"), CellValue::text("survey"), CellValue::text("pvt")]
        );
    }

    #[test]
    fn join_fails_when_renaming_cannot_resolve_a_collision() {
        let survey = table(&["score", "score_pvt"], &[]);
        let pvt = table(&["score"], &[]);
        let error = inner_join(&survey, &pvt).expect_err("collision rejected");
        assert!(matches!(error, ReconcileError::CombineFailure { .. }));
    }

    #[test]
    fn join_keeps_survey_duplicates_in_survey_order() {
        let survey = table(
            &["Name"],
            &[("FS_2", &["B"]), ("FS_1", &["A"]), ("FS_2", &["B2"])],
        );
        let pvt = table(&["score"], &[("FS_1", &["1"]), ("FS_2", &["2"])]);

        let joined = inner_join(&survey, &pvt).expect("joined").joined;
        let names: Vec<String> = joined
            .records
            .iter()
            .map(|record| record.values[0].to_string())
            .collect();
        assert_eq!(names, vec!["B", "A", "B2"]);
    }

    #[test]
    fn unmatched_records_are_split_off() {
        let survey = table(&["Name"], &[("FS_1", &["A"]), ("FS_9", &["Z"])]);
        let pvt = table(&["score"], &[("FS_1", &["1"]), ("FS_5", &["5"])]);
        let tables = inner_join(&survey, &pvt).expect("joined");

        assert_eq!(tables.joined.len(), 1);
        assert_eq!(tables.survey_only.records[0].key, CellValue::text("FS_9"));
        assert_eq!(tables.pvt_only.records[0].key, CellValue::text("FS_5"));
        assert_eq!(tables.survey_only.len() + tables.pvt_only.len(), 2);
    }

    #[test]
    fn unprefixed_pvt_keys_match_prefixed_survey_keys() {
        let survey = table(&["Name"], &[("FS_S1", &["A"])]);
        let pvt = table(&["score"], &[("S1", &["3"])]);
        let tables = inner_join(&survey, &pvt).expect("joined");

        assert_eq!(tables.joined.records[0].key, CellValue::text("S1"));
        assert!(tables.survey_only.is_empty());
        assert!(tables.pvt_only.is_empty());
    }

    #[test]
    fn both_key_spellings_in_the_pvt_table_are_distinct_sessions() {
        let survey = table(&["Name"], &[("FS_S1", &["A"])]);
        let pvt = table(&["score"], &[("FS_S1", &["1"]), ("S1", &["2"])]);
        let tables = inner_join(&survey, &pvt).expect("both spellings accepted");

        assert_eq!(tables.joined.len(), 1);
        assert_eq!(tables.joined.records[0].key, CellValue::text("FS_S1"));
        assert_eq!(tables.joined.records[0].values[1], CellValue::text("1"));
        assert_eq!(tables.pvt_only.len(), 1);
        assert_eq!(tables.pvt_only.records[0].key, CellValue::text("S1"));
    }
}
