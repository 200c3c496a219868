use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, Range, Reader};

use super::{Cell, HeaderRow, Table};
use crate::error::{Error, Result};

/// Read the first worksheet as a dense grid anchored at A1.
fn read_grid(data: &[u8]) -> Result<Vec<Vec<Cell>>> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(data))
        .map_err(|e| Error::Parse(e.to_string()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| Error::Parse("workbook has no worksheets".to_string()))?
        .map_err(|e| Error::Parse(e.to_string()))?;
    Ok(grid_from_range(&range))
}

fn grid_from_range(range: &Range<Data>) -> Vec<Vec<Cell>> {
    let (Some((row0, col0)), Some((row1, col1))) = (range.start(), range.end()) else {
        return Vec::new();
    };
    let (row0, col0) = (row0 as usize, col0 as usize);
    let height = row1 as usize + 1;
    let width = col1 as usize + 1;

    let mut grid = vec![vec![Cell::Empty; width]; height];
    // Coordinates from `cells()` are relative to `range.start()`.
    for (row, col, value) in range.cells() {
        grid[row0 + row][col0 + col] = Cell::from(value);
    }
    grid
}

/// Parse with the given row as column labels. Rows above it are dropped.
pub fn parse_headered(data: &[u8], header: HeaderRow) -> Result<Table> {
    let mut grid = read_grid(data)?;
    let index = header.index0();
    if index >= grid.len() {
        return Err(Error::Parse(format!(
            "header row {} is past the last row ({})",
            header,
            grid.len()
        )));
    }

    let rows = grid.split_off(index + 1);
    let labels = grid
        .pop()
        .unwrap_or_default()
        .iter()
        .enumerate()
        .map(|(i, cell)| match cell {
            Cell::Empty => format!("Unnamed: {}", i),
            other => other.to_string(),
        })
        .collect();
    Ok(Table::new(labels, rows))
}

/// Parse with positional labels `"0"`, `"1"`, ... and every row as data.
pub fn parse_headerless(data: &[u8]) -> Result<Table> {
    let grid = read_grid(data)?;
    let width = grid.first().map_or(0, Vec::len);
    let labels = (0..width).map(|i| i.to_string()).collect();
    Ok(Table::new(labels, grid))
}

/// Headered parse, falling back once to a headerless parse on any error.
pub fn load_table(data: &[u8], header: HeaderRow) -> Result<Table> {
    match parse_headered(data, header) {
        Ok(table) => Ok(table),
        Err(err) => {
            log::warn!("headered parse failed ({}); retrying without a header row", err);
            parse_headerless(data)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_xlsxwriter::Workbook;

    fn workbook(cells: &[(u32, u16, &str)], numbers: &[(u32, u16, f64)]) -> Vec<u8> {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        for (row, col, text) in cells {
            sheet.write_string(*row, *col, *text).unwrap();
        }
        for (row, col, value) in numbers {
            sheet.write_number(*row, *col, *value).unwrap();
        }
        workbook.save_to_buffer().unwrap()
    }

    fn sample() -> Vec<u8> {
        workbook(
            &[(0, 0, "id"), (0, 1, "name"), (0, 2, "id"), (1, 1, "Alice")],
            &[(1, 0, 1.0), (1, 2, 2.0)],
        )
    }

    #[test]
    fn first_row_headers() {
        let table = parse_headered(&sample(), HeaderRow::FIRST).unwrap();
        assert_eq!(table.columns(), ["id", "name", "id"]);
        assert_eq!(
            table.rows(),
            [vec![
                Cell::Float(1.0),
                Cell::Text("Alice".into()),
                Cell::Float(2.0)
            ]]
        );
    }

    #[test]
    fn later_header_row_drops_rows_above() {
        let data = workbook(
            &[(0, 0, "report title"), (2, 0, "a"), (2, 1, "b")],
            &[(3, 0, 1.0), (3, 1, 2.0)],
        );
        let table = parse_headered(&data, HeaderRow::new(3).unwrap()).unwrap();
        assert_eq!(table.columns(), ["a", "b"]);
        assert_eq!(table.height(), 1);
    }

    #[test]
    fn blank_header_cells_get_placeholder_names() {
        let data = workbook(&[(0, 0, "a"), (0, 2, "c"), (1, 1, "x")], &[]);
        let table = parse_headered(&data, HeaderRow::FIRST).unwrap();
        assert_eq!(table.columns(), ["a", "Unnamed: 1", "c"]);
    }

    #[test]
    fn grid_is_anchored_at_a1() {
        let data = workbook(&[(1, 1, "h")], &[(2, 1, 5.0)]);
        let table = parse_headerless(&data).unwrap();
        assert_eq!(table.columns(), ["0", "1"]);
        assert_eq!(table.height(), 3);
        assert!(table.rows()[0].iter().all(Cell::is_empty));
        assert_eq!(table.rows()[2][1], Cell::Float(5.0));
    }

    #[test]
    fn header_past_the_end_falls_back() {
        let data = sample();
        assert!(matches!(
            parse_headered(&data, HeaderRow::new(10).unwrap()),
            Err(Error::Parse(_))
        ));

        let table = load_table(&data, HeaderRow::new(10).unwrap()).unwrap();
        assert_eq!(table.columns(), ["0", "1", "2"]);
        assert_eq!(table.height(), 2);
        assert_eq!(table.rows()[0][0], Cell::Text("id".into()));
    }

    #[test]
    fn garbage_is_a_parse_error() {
        let err = load_table(b"definitely not a workbook", HeaderRow::FIRST).unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }
}
