use genco_client::domain::HourlyGeneration;

use crate::{
    pipeline::{Envelope, PipelineError, Transform},
    sources::RawGrid,
};

pub const DATE_COLUMN: &str = "Date";
pub const UNIT_COLUMN: &str = "Genco";
pub const UNIT_OUTPUT_COLUMN: &str = "Gencos";
pub const ORDINAL_COLUMN: &str = "#";
pub const TOTAL_COLUMN: &str = "TotalGeneration";
pub const NEXT_MIDNIGHT: &str = "24:00";
pub const MIDNIGHT: &str = "00:00";

/// Wide report table: one row per unit, one column per hour.
///
/// Labels may repeat (renaming `24:00` onto `00:00` does that), so columns are
/// addressed by every position carrying a label. Missing cells are `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WideTable {
    columns: Vec<String>,
    rows: Vec<Vec<Option<String>>>,
}

impl WideTable {
    /// Lay the grid out under `Date` plus the source headers.
    ///
    /// Short rows are padded with missing cells; a row wider than the header
    /// means the layout changed and is rejected.
    pub fn from_grid(grid: &RawGrid) -> Result<Self, PipelineError> {
        let mut columns = Vec::with_capacity(grid.headers.len() + 1);
        columns.push(DATE_COLUMN.to_string());
        columns.extend(grid.headers.iter().cloned());

        let mut rows = vec![vec![None; columns.len()]; grid.rows.len()];
        for cell in grid.cells() {
            if cell.col >= columns.len() {
                return Err(PipelineError::Parse(format!(
                    "row {} has {} cells but the table has {} columns",
                    cell.row,
                    grid.rows[cell.row].len(),
                    columns.len()
                )));
            }
            if !cell.is_missing() {
                rows[cell.row][cell.col] = Some(cell.text);
            }
        }

        Ok(Self { columns, rows })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn positions(&self, name: &str) -> Vec<usize> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.as_str() == name)
            .map(|(i, _)| i)
            .collect()
    }

    fn require(&self, name: &str) -> Result<Vec<usize>, PipelineError> {
        let positions = self.positions(name);
        if positions.is_empty() {
            return Err(PipelineError::Parse(format!(
                "column '{name}' not found in report header"
            )));
        }
        Ok(positions)
    }

    /// Drop rows where any `name` cell is missing. Returns how many were dropped.
    pub fn drop_rows_missing(&mut self, name: &str) -> Result<usize, PipelineError> {
        let positions = self.require(name)?;
        let before = self.rows.len();
        self.rows.retain(|row| positions.iter().all(|&i| row[i].is_some()));
        Ok(before - self.rows.len())
    }

    pub fn drop_column(&mut self, name: &str) -> Result<(), PipelineError> {
        let positions = self.require(name)?;
        for &i in positions.iter().rev() {
            self.columns.remove(i);
            for row in &mut self.rows {
                row.remove(i);
            }
        }
        Ok(())
    }

    pub fn drop_column_if_exists(&mut self, name: &str) -> bool {
        if self.positions(name).is_empty() {
            return false;
        }
        self.drop_column(name).is_ok()
    }

    /// Rename every column labelled `from`. Returns how many were renamed.
    pub fn rename_column(&mut self, from: &str, to: &str) -> usize {
        let mut renamed = 0;
        for c in self.columns.iter_mut().filter(|c| c.as_str() == from) {
            *c = to.to_string();
            renamed += 1;
        }
        renamed
    }

    /// Melt every column other than `Date` and `Gencos` into `(Hour, value)`
    /// pairs, hour column by hour column, rows in table order within each.
    pub fn unpivot(&self) -> Result<Vec<HourlyGeneration>, PipelineError> {
        let date_at = self.require(DATE_COLUMN)?[0];
        let unit_at = self.require(UNIT_OUTPUT_COLUMN)?[0];

        let hour_columns: Vec<(usize, &String)> = self
            .columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.as_str() != DATE_COLUMN && c.as_str() != UNIT_OUTPUT_COLUMN)
            .collect();

        let mut out = Vec::with_capacity(self.rows.len() * hour_columns.len());
        for (col, hour) in hour_columns {
            for (i, row) in self.rows.iter().enumerate() {
                let date = row[date_at]
                    .clone()
                    .ok_or_else(|| PipelineError::Parse(format!("row {i} has no date")))?;
                let gencos = row[unit_at]
                    .clone()
                    .ok_or_else(|| PipelineError::Parse(format!("row {i} has no unit name")))?;

                out.push(HourlyGeneration {
                    date,
                    hour: hour.clone(),
                    gencos,
                    energy_generated_mwh: row[col].clone(),
                });
            }
        }

        Ok(out)
    }
}

/// Reshape the scraped report into one record per unit and hour.
///
/// Steps, in order: drop rows without a unit name, drop the total and
/// ordinal columns, fold `24:00` into `00:00`, rename `Genco` to `Gencos`,
/// then unpivot. Missing `Genco` or `#` columns fail the whole transform.
pub fn unpivot_hourly(grid: &RawGrid) -> Result<Vec<HourlyGeneration>, PipelineError> {
    let mut table = WideTable::from_grid(grid)?;

    let dropped = table.drop_rows_missing(UNIT_COLUMN)?;
    if dropped > 0 {
        metrics::counter!("transform_rows_without_unit_total").increment(dropped as u64);
        tracing::debug!(dropped, "dropped rows without a unit name");
    }

    table.drop_column_if_exists(TOTAL_COLUMN);
    table.drop_column(ORDINAL_COLUMN)?;

    table.rename_column(NEXT_MIDNIGHT, MIDNIGHT);
    table.rename_column(UNIT_COLUMN, UNIT_OUTPUT_COLUMN);

    table.unpivot()
}

#[derive(Clone, Default)]
pub struct HourlyUnpivot;

impl Transform<RawGrid, Vec<HourlyGeneration>> for HourlyUnpivot {
    fn apply(
        &self,
        input: Envelope<RawGrid>,
    ) -> Result<Envelope<Vec<HourlyGeneration>>, PipelineError> {
        match unpivot_hourly(&input.payload) {
            Ok(records) => Ok(Envelope {
                payload: records,
                received_at: input.received_at,
            }),
            Err(e) => {
                metrics::counter!("transform_rejected_total").increment(1);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(headers: &[&str], rows: &[&[&str]]) -> RawGrid {
        RawGrid {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|c| c.to_string()).collect())
                .collect(),
        }
    }

    fn record(date: &str, hour: &str, gencos: &str, mwh: Option<&str>) -> HourlyGeneration {
        HourlyGeneration {
            date: date.to_string(),
            hour: hour.to_string(),
            gencos: gencos.to_string(),
            energy_generated_mwh: mwh.map(str::to_string),
        }
    }

    #[test]
    fn single_row_with_total_and_next_midnight() {
        let g = grid(
            &["#", "Genco", "00:00", "01:00", "24:00", "TotalGeneration"],
            &[&["2024-01-01", "1", "GenA", "10", "12", "9", "31"]],
        );

        let out = unpivot_hourly(&g).unwrap();

        assert_eq!(
            out,
            vec![
                record("2024-01-01", "00:00", "GenA", Some("10")),
                record("2024-01-01", "01:00", "GenA", Some("12")),
                record("2024-01-01", "00:00", "GenA", Some("9")),
            ]
        );
    }

    #[test]
    fn whitespace_unit_rows_contribute_nothing() {
        let g = grid(
            &["#", "Genco", "00:00", "01:00"],
            &[
                &["2024-01-01", "1", "GenA", "10", "11"],
                &["2024-01-01", "", "  ", "999", "999"],
                &["2024-01-01", "2", "GenB", "20", "21"],
            ],
        );

        let out = unpivot_hourly(&g).unwrap();

        assert_eq!(out.len(), 4);
        assert!(out.iter().all(|r| r.gencos == "GenA" || r.gencos == "GenB"));
        assert!(out.iter().all(|r| r.energy_generated_mwh.as_deref() != Some("999")));
    }

    #[test]
    fn output_is_hour_major_in_row_order() {
        let g = grid(
            &["#", "Genco", "00:00", "01:00"],
            &[
                &["2024-01-01", "1", "GenA", "10", "11"],
                &["2024-01-01", "2", "GenB", "20", "21"],
            ],
        );

        let order: Vec<(String, String)> = unpivot_hourly(&g)
            .unwrap()
            .into_iter()
            .map(|r| (r.hour, r.gencos))
            .collect();

        assert_eq!(
            order,
            vec![
                ("00:00".to_string(), "GenA".to_string()),
                ("00:00".to_string(), "GenB".to_string()),
                ("01:00".to_string(), "GenA".to_string()),
                ("01:00".to_string(), "GenB".to_string()),
            ]
        );
    }

    #[test]
    fn row_count_is_retained_rows_times_hours() {
        let mut headers = vec!["#".to_string(), "Genco".to_string()];
        headers.extend((1..=24).map(|h| format!("{h:02}:00")));
        headers.push("TotalGeneration".to_string());

        let rows: Vec<Vec<String>> = (0..5)
            .map(|i| {
                let mut r = vec!["2024-01-01".to_string(), i.to_string()];
                r.push(if i == 3 { String::new() } else { format!("Unit{i}") });
                r.extend((0..24).map(|h| h.to_string()));
                r.push("0".to_string());
                r
            })
            .collect();

        let out = unpivot_hourly(&RawGrid { headers, rows }).unwrap();

        assert_eq!(out.len(), 4 * 24);
        assert!(out.iter().all(|r| r.hour != "24:00"));
        assert_eq!(out.iter().filter(|r| r.hour == "00:00").count(), 4);
    }

    #[test]
    fn blank_hour_cells_become_missing_values() {
        let g = grid(&["#", "Genco", "00:00", "01:00"], &[&["2024-01-01", "1", "GenA", " ", "7"]]);

        let out = unpivot_hourly(&g).unwrap();

        assert_eq!(out[0], record("2024-01-01", "00:00", "GenA", None));
        assert_eq!(out[1], record("2024-01-01", "01:00", "GenA", Some("7")));
    }

    #[test]
    fn short_rows_are_padded() {
        let g = grid(&["#", "Genco", "00:00", "01:00"], &[&["2024-01-01", "1", "GenA", "5"]]);

        let out = unpivot_hourly(&g).unwrap();

        assert_eq!(out.len(), 2);
        assert_eq!(out[1].energy_generated_mwh, None);
    }

    #[test]
    fn wide_rows_are_rejected() {
        let g = grid(&["#", "Genco", "00:00"], &[&["2024-01-01", "1", "GenA", "5", "6"]]);
        assert!(matches!(unpivot_hourly(&g), Err(PipelineError::Parse(_))));
    }

    #[test]
    fn missing_ordinal_column_fails() {
        let g = grid(&["Genco", "00:00"], &[&["2024-01-01", "GenA", "5"]]);
        let err = unpivot_hourly(&g).unwrap_err();
        assert!(err.to_string().contains("'#'"));
    }

    #[test]
    fn missing_unit_column_fails() {
        let g = grid(&["#", "Unit", "00:00"], &[&["2024-01-01", "1", "GenA", "5"]]);
        let err = unpivot_hourly(&g).unwrap_err();
        assert!(err.to_string().contains("'Genco'"));
    }

    #[test]
    fn transform_is_repeatable() {
        let g = grid(
            &["#", "Genco", "00:00", "24:00"],
            &[&["2024-01-01", "1", "GenA", "1", "2"], &["2024-01-01", "2", "GenB", "3", ""]],
        );
        assert_eq!(unpivot_hourly(&g).unwrap(), unpivot_hourly(&g).unwrap());
    }

    #[test]
    fn wide_table_column_operations() {
        let g = grid(&["#", "Genco", "24:00", "TotalGeneration"], &[]);
        let mut t = WideTable::from_grid(&g).unwrap();

        assert!(t.drop_column_if_exists("TotalGeneration"));
        assert!(!t.drop_column_if_exists("TotalGeneration"));
        assert_eq!(t.rename_column("24:00", "00:00"), 1);
        assert_eq!(t.rename_column("24:00", "00:00"), 0);
        assert_eq!(t.columns(), ["Date", "#", "Genco", "00:00"]);
        assert_eq!(t.row_count(), 0);
    }

    #[test]
    fn apply_keeps_extraction_time() {
        let g = grid(&["#", "Genco", "00:00"], &[&["2024-01-01", "1", "GenA", "5"]]);
        let input = Envelope::now(g);
        let received_at = input.received_at;

        let out = HourlyUnpivot.apply(input).unwrap();

        assert_eq!(out.received_at, received_at);
        assert_eq!(out.payload.len(), 1);
    }
}
