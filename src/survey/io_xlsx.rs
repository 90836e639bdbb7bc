use calamine::{open_workbook, DataType, Reader, Xlsx};
use chrono::{Duration, NaiveDate};

use crate::survey::{
    io_common::{get_col_index_mapping, make_default_id, parse_row},
    *,
};

pub fn read_excel_responses(
    path: String,
    cfs: &FileSource,
    question_ids: &[String],
) -> ScoreResult<Vec<ParsedResponse>> {
    let default_id = make_default_id(&path);

    let wrange = get_range(&path, cfs)?;

    let header_row = wrange.rows().next().context(EmptyExcelSnafu { path: &path })?;
    let header: Vec<Option<String>> = header_row
        .iter()
        .map(|dt| match dt {
            DataType::String(s) => Some(s.clone()),
            _ => None,
        })
        .collect();
    debug!("read_excel_responses: header: {:?}", header);
    let layout = get_col_index_mapping(&header, cfs, question_ids);

    let mut res: Vec<ParsedResponse> = Vec::new();
    for (idx, row) in wrange.rows().enumerate().skip(1) {
        // Line numbers as displayed by spreadsheets
        let lineno = idx + 1;
        let mut cells: Vec<String> = Vec::new();
        for dt in row.iter() {
            cells.push(cell_to_string(dt, lineno)?);
        }
        if cells.iter().all(|s| s.trim().is_empty()) {
            debug!("read_excel_responses: skipping empty line {}", lineno);
            continue;
        }
        res.push(parse_row(&layout, &cells, lineno, &default_id)?);
    }
    Ok(res)
}

/// Renders a cell the way it would appear in a CSV export.
fn cell_to_string(dt: &DataType, lineno: usize) -> ScoreResult<String> {
    match dt {
        DataType::String(s) => Ok(s.clone()),
        DataType::Float(f) => Ok(f.to_string()),
        DataType::Int(i) => Ok(i.to_string()),
        DataType::Bool(b) => Ok(b.to_string()),
        DataType::Empty => Ok(String::new()),
        DataType::DateTime(serial) => excel_serial_to_rfc3339(*serial).context(InvalidCellSnafu {
            lineno,
            field: "date",
            content: format!("{:?}", dt),
        }),
        _ => InvalidCellSnafu {
            lineno,
            field: "cell",
            content: format!("{:?}", dt),
        }
        .fail(),
    }
}

/// Spreadsheet dates are a number of days since 1899-12-30.
fn excel_serial_to_rfc3339(serial: f64) -> Option<String> {
    if !serial.is_finite() {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let ms = (serial * 86_400_000.0).round() as i64;
    let ndt = epoch.checked_add_signed(Duration::milliseconds(ms))?;
    Some(format!("{}Z", ndt.format("%Y-%m-%dT%H:%M:%S")))
}

fn get_range(path: &String, cfs: &FileSource) -> ScoreResult<calamine::Range<DataType>> {
    let worksheet_name_o = cfs.excel_worksheet_name.clone();
    debug!(
        "read_excel_file: path: {:?} worksheet: {:?}",
        &path, &worksheet_name_o
    );
    let mut workbook: Xlsx<_> = open_workbook(path).context(OpeningExcelSnafu { path })?;

    // A worksheet name was provided, use it.
    if let Some(worksheet_name) = worksheet_name_o {
        let wrange = workbook
            .worksheet_range(&worksheet_name)
            .context(MissingWorksheetSnafu {
                name: &worksheet_name,
                path,
            })?
            .context(OpeningExcelSnafu { path })?;
        Ok(wrange)
    } else {
        let all_worksheets = workbook.worksheets();
        match all_worksheets.as_slice() {
            [] => EmptyExcelSnafu { path }.fail(),
            [(worksheet_name, wrange)] => {
                debug!(
                    "read_excel_file: path: {:?} worksheet: {:?}",
                    &path, &worksheet_name
                );
                Ok(wrange.clone())
            }
            _ => AmbiguousWorksheetSnafu { path }.fail(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cells_as_text() {
        assert_eq!(cell_to_string(&DataType::Float(4.0), 2).unwrap(), "4");
        assert_eq!(cell_to_string(&DataType::Float(3.5), 2).unwrap(), "3.5");
        assert_eq!(cell_to_string(&DataType::Int(5), 2).unwrap(), "5");
        assert_eq!(cell_to_string(&DataType::Empty, 2).unwrap(), "");
        assert_eq!(cell_to_string(&DataType::Bool(false), 2).unwrap(), "false");
        assert_eq!(
            cell_to_string(&DataType::String("r1".to_string()), 2).unwrap(),
            "r1"
        );
    }

    #[test]
    fn spreadsheet_dates() {
        assert_eq!(
            excel_serial_to_rfc3339(45323.5).as_deref(),
            Some("2024-02-01T12:00:00Z")
        );
        assert_eq!(
            cell_to_string(&DataType::DateTime(45323.0), 3).unwrap(),
            "2024-02-01T00:00:00Z"
        );
        assert_eq!(excel_serial_to_rfc3339(f64::NAN), None);
    }

    #[test]
    fn missing_workbook() {
        let cfs = FileSource::for_input("nope.xlsx", "xlsx".to_string());
        let res = read_excel_responses("/nonexistent/nope.xlsx".to_string(), &cfs, &[]);
        assert!(matches!(res, Err(ScoreError::OpeningExcel { .. })));
    }
}
