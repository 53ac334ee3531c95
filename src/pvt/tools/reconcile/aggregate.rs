use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::pvt::tools::error::ReconcileError;
use crate::pvt::tools::model::{CellValue, KeyedRecord, KeyedTable};

/// Column of the PVT export holding the test timestamp.
pub const DATETIME_COLUMN: &str = "datetime";

const DATETIME_LAYOUTS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

const DATE_LAYOUTS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y"];

/// Parses a text timestamp in any of the layouts the PVT exports use.
pub fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    DATETIME_LAYOUTS
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(text, layout).ok())
        .or_else(|| {
            DateTime::parse_from_rfc3339(text)
                .ok()
                .map(|parsed| parsed.naive_utc())
        })
        .or_else(|| {
            DATE_LAYOUTS
                .iter()
                .find_map(|layout| NaiveDate::parse_from_str(text, layout).ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

/// Converts the `datetime` column of the PVT table into timestamps in place.
pub fn normalize_datetimes(table: &mut KeyedTable) -> Result<(), ReconcileError> {
    let index = table
        .column_index(DATETIME_COLUMN)
        .ok_or_else(|| ReconcileError::pvt(format!("column '{DATETIME_COLUMN}' is missing")))?;

    for record in &mut table.records {
        let cell = &mut record.values[index];
        let parsed = match &*cell {
            CellValue::Empty | CellValue::DateTime(_) => continue,
            CellValue::Text(text) => parse_datetime(text),
            _ => None,
        };
        match parsed {
            Some(timestamp) => *cell = CellValue::DateTime(timestamp),
            None => {
                return Err(ReconcileError::pvt(format!(
                    "cannot parse '{}' as a {DATETIME_COLUMN} for key '{}'",
                    cell, record.key
                )));
            }
        }
    }

    Ok(())
}

/// Renders timestamps in the `datetime` column back to canonical text.
pub fn format_datetimes(table: &mut KeyedTable) {
    let Some(index) = table.column_index(DATETIME_COLUMN) else {
        return;
    };
    for record in &mut table.records {
        if let CellValue::DateTime(_) = record.values[index] {
            record.values[index] = CellValue::Text(record.values[index].to_string());
        }
    }
}

/// Collapses a group of values from one column.
///
/// A group of several values yields its minimum, skipping empty cells; a
/// single value is passed through unchanged and an empty group yields an
/// empty string. The minimum is applied to every column, ordinal or not.
pub fn min_or_single(values: &[&CellValue]) -> Result<CellValue, String> {
    match values {
        [] => Ok(CellValue::text("")),
        [single] => Ok((*single).clone()),
        _ => {
            let mut present = values.iter().copied().filter(|value| !value.is_empty());
            let Some(mut minimum) = present.next() else {
                return Ok(CellValue::Empty);
            };
            for value in present {
                match value.try_cmp(minimum) {
                    Some(Ordering::Less) => minimum = value,
                    Some(_) => {}
                    None => {
                        return Err(format!(
                            "cannot compare {} with {}",
                            value.kind_name(),
                            minimum.kind_name()
                        ));
                    }
                }
            }
            Ok(minimum.clone())
        }
    }
}

/// Grouping key ordered with [`CellValue::total_cmp`].
struct GroupKey(CellValue);

impl PartialEq for GroupKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for GroupKey {}

impl PartialOrd for GroupKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for GroupKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Groups records by key and reduces every column with [`min_or_single`].
/// Records without a key are dropped. The result holds one record per key,
/// in ascending key order.
pub fn aggregate_by_key(table: &KeyedTable) -> Result<KeyedTable, ReconcileError> {
    let mut groups: BTreeMap<GroupKey, Vec<&KeyedRecord>> = BTreeMap::new();
    for record in &table.records {
        if record.key.is_empty() {
            continue;
        }
        groups
            .entry(GroupKey(record.key.clone()))
            .or_default()
            .push(record);
    }

    let mut aggregated = KeyedTable::new(table.key_column.clone(), table.columns.clone());
    for (GroupKey(key), members) in groups {
        let values = table
            .columns
            .iter()
            .enumerate()
            .map(|(col_idx, column)| {
                let column_values: Vec<&CellValue> = members
                    .iter()
                    .map(|record| &record.values[col_idx])
                    .collect();
                min_or_single(&column_values).map_err(|reason| {
                    ReconcileError::pvt(format!("column '{column}' for key '{key}': {reason}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        aggregated.records.push(KeyedRecord { key, values });
    }

    Ok(aggregated)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pvt(rows: &[(&str, CellValue, CellValue)]) -> KeyedTable {
        let mut table = KeyedTable::new("sessionID", vec!["datetime".into(), "score".into()]);
        for (key, datetime, score) in rows {
            table.records.push(KeyedRecord {
                key: CellValue::text(*key),
                values: vec![datetime.clone(), score.clone()],
            });
        }
        table
    }

    #[test]
    fn parses_common_layouts() {
        let expected = "2024-01-01 09:00:00";
        for text in [
            "2024-01-01 09:00",
            "2024-01-01 09:00:00",
            "2024-01-01T09:00:00.000",
            "2024-01-01T09:00:00Z",
            "01/01/2024 09:00",
        ] {
            let parsed = parse_datetime(text).expect("layout accepted");
            assert_eq!(parsed.format("%Y-%m-%d %H:%M:%S").to_string(), expected);
        }
        assert!(parse_datetime("2024-01-01").is_some());
        assert!(parse_datetime("yesterday").is_none());
    }

    #[test]
    fn unparseable_datetimes_fail_the_pvt_stage() {
        let mut table = pvt(&[("S1", CellValue::text("soon"), CellValue::Number(1.0))]);
        let error = normalize_datetimes(&mut table).expect_err("garbage rejected");
        assert!(matches!(error, ReconcileError::InvalidPvtFormat { .. }));
    }

    #[test]
    fn missing_datetime_column_fails_the_pvt_stage() {
        let mut table = KeyedTable::new("sessionID", vec!["score".into()]);
        let error = normalize_datetimes(&mut table).expect_err("column required");
        assert!(error.reason().contains("datetime"));
    }

    #[test]
    fn duplicate_keys_collapse_to_column_minimums() {
        let mut table = pvt(&[
            ("S1", CellValue::text("2024-01-01 10:00"), CellValue::Number(5.0)),
            ("S2", CellValue::text("2024-01-02 08:00"), CellValue::Number(7.0)),
            ("S1", CellValue::text("2024-01-01 09:00"), CellValue::Number(3.0)),
        ]);
        normalize_datetimes(&mut table).expect("datetimes parsed");
        let mut aggregated = aggregate_by_key(&table).expect("aggregated");
        format_datetimes(&mut aggregated);

        assert_eq!(aggregated.len(), 2);
        let first = &aggregated.records[0];
        assert_eq!(first.key, CellValue::text("S1"));
        assert_eq!(first.values[0], CellValue::text("2024-01-01 09:00:00"));
        assert_eq!(first.values[1], CellValue::Number(3.0));
        assert_eq!(aggregated.records[1].values[1], CellValue::Number(7.0));
    }

    #[test]
    fn minimum_is_taken_per_column_independently() {
        let table = pvt(&[
            ("S1", CellValue::text("b"), CellValue::Number(1.0)),
            ("S1", CellValue::text("a"), CellValue::Number(9.0)),
        ]);
        let aggregated = aggregate_by_key(&table).expect("aggregated");
        assert_eq!(
            aggregated.records[0].values,
            vec![CellValue::text("a"), CellValue::Number(1.0)]
        );
    }

    #[test]
    fn reducer_skips_empty_cells() {
        let values = [&CellValue::Empty, &CellValue::text("zeta"), &CellValue::text("alpha")];
        assert_eq!(min_or_single(&values), Ok(CellValue::text("alpha")));
        assert_eq!(
            min_or_single(&[&CellValue::Empty, &CellValue::Empty]),
            Ok(CellValue::Empty)
        );
        assert_eq!(min_or_single(&[]), Ok(CellValue::text("")));
        assert_eq!(min_or_single(&[&CellValue::Empty]), Ok(CellValue::Empty));
    }

    #[test]
    fn mixed_kinds_cannot_be_reduced() {
        let table = pvt(&[
            ("S1", CellValue::Empty, CellValue::Number(1.0)),
            ("S1", CellValue::Empty, CellValue::text("one")),
        ]);
        let error = aggregate_by_key(&table).expect_err("mixed kinds rejected");
        assert!(matches!(error, ReconcileError::InvalidPvtFormat { .. }));
        assert!(error.reason().contains("score"));
    }

    #[test]
    fn records_without_a_key_are_dropped() {
        let mut table = pvt(&[("S1", CellValue::Empty, CellValue::Number(1.0))]);
        table.records.push(KeyedRecord {
            key: CellValue::Empty,
            values: vec![CellValue::Empty, CellValue::Number(2.0)],
        });
        let aggregated = aggregate_by_key(&table).expect("aggregated");
        assert_eq!(aggregated.len(), 1);
    }
}
