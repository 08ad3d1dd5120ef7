//! Parsing of the engine's side-channel metadata and `;`-delimited result file.

use crate::error::DecodeError;
use ndarray::Array2;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

pub const FIELD_DELIMITER: char = ';';
pub const PAIR_DELIMITER: char = ':';

#[derive(Debug, Clone, PartialEq)]
pub struct RunMetadata {
    pub build_time: f64,
    pub query_time: f64,
    pub params: String,
}

/// Row-aligned neighbor ids and distances, both shaped `[queries][neighbors]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultMatrices {
    pub knns: Array2<i64>,
    pub dists: Array2<f64>,
}

impl ResultMatrices {
    pub fn queries(&self) -> usize {
        self.knns.nrows()
    }

    pub fn neighbors_per_query(&self) -> usize {
        self.knns.ncols()
    }
}

fn read_text(path: &Path) -> Result<String, DecodeError> {
    fs::read_to_string(path).map_err(|source| DecodeError::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub fn decode(
    side_channel: &Path,
    result_csv: &Path,
) -> Result<(RunMetadata, ResultMatrices), DecodeError> {
    let metadata = parse_metadata(&read_text(side_channel)?).map_err(|reason| {
        DecodeError::MalformedMetadata {
            path: side_channel.to_path_buf(),
            reason,
        }
    })?;
    let text = read_text(result_csv)?;
    let matrices = parse_results(&text)?
        .ok_or_else(|| DecodeError::EmptyResult(result_csv.to_path_buf()))?;
    Ok((metadata, matrices))
}

/// Splits `key:value;key:value` into a map. Each token splits on its first
/// `:` only, so a value keeps any later colons.
pub fn parse_pairs(text: &str) -> Result<BTreeMap<String, String>, String> {
    let mut out = BTreeMap::new();
    for token in text.trim().split(FIELD_DELIMITER) {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        let (key, value) = token
            .split_once(PAIR_DELIMITER)
            .ok_or_else(|| format!("token '{}' is not key:value", token))?;
        out.insert(key.trim().to_string(), value.trim().to_string());
    }
    Ok(out)
}

pub fn parse_metadata(text: &str) -> Result<RunMetadata, String> {
    let pairs = parse_pairs(text)?;
    let seconds = |key: &str| -> Result<f64, String> {
        let raw = pairs
            .get(key)
            .ok_or_else(|| format!("missing required key '{}'", key))?;
        raw.parse::<f64>()
            .map_err(|_| format!("'{}' is not a number: '{}'", key, raw))
    };
    Ok(RunMetadata {
        build_time: seconds("buildtime")?,
        query_time: seconds("querytime")?,
        params: pairs.get("params").cloned().unwrap_or_default(),
    })
}

fn parse_cell(cell: &str) -> Option<(i64, f64)> {
    let (id, dist) = cell.trim().split_once(PAIR_DELIMITER)?;
    Some((id.trim().parse().ok()?, dist.trim().parse().ok()?))
}

/// Decodes headerless `id:distance;id:distance` rows. Blank lines are
/// ignored; any other line must be a data row. Returns `None` when the text
/// holds no rows at all. Row and column numbers in errors are 1-based.
pub fn parse_results(text: &str) -> Result<Option<ResultMatrices>, DecodeError> {
    let mut ids = Vec::new();
    let mut dists = Vec::new();
    let mut width = None;
    let mut rows = 0;
    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        rows += 1;
        let cells: Vec<&str> = line.split(FIELD_DELIMITER).collect();
        match width {
            None => width = Some(cells.len()),
            Some(expected) if expected != cells.len() => {
                return Err(DecodeError::RaggedResult {
                    row: rows,
                    expected,
                    found: cells.len(),
                })
            }
            Some(_) => {}
        }
        for (col, cell) in cells.iter().enumerate() {
            let (id, dist) = parse_cell(cell).ok_or_else(|| DecodeError::MalformedResultRow {
                row: rows,
                column: col + 1,
                cell: cell.to_string(),
            })?;
            ids.push(id);
            dists.push(dist);
        }
    }
    let Some(width) = width else {
        return Ok(None);
    };
    let shape = (rows, width);
    let knns = Array2::from_shape_vec(shape, ids).map_err(|_| DecodeError::RaggedResult {
        row: rows,
        expected: width,
        found: 0,
    })?;
    let dists = Array2::from_shape_vec(shape, dists).map_err(|_| DecodeError::RaggedResult {
        row: rows,
        expected: width,
        found: 0,
    })?;
    Ok(Some(ResultMatrices { knns, dists }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn decoded(text: &str) -> ResultMatrices {
        parse_results(text).expect("decode").expect("non-empty")
    }

    #[test]
    fn decodes_ids_and_distances_row_aligned() {
        let m = decoded("3:0.5;7:1.2\n1:0.0;9:9.9\n");
        assert_eq!(m.knns, array![[3i64, 7], [1, 9]]);
        assert_eq!(m.dists, array![[0.5, 1.2], [0.0, 9.9]]);
        assert_eq!(m.knns.shape(), m.dists.shape());
        assert_eq!(m.queries(), 2);
        assert_eq!(m.neighbors_per_query(), 2);
    }

    #[test]
    fn tolerates_crlf_and_trailing_blank_lines() {
        let m = decoded("5:2.0\r\n6:3.0\r\n\r\n");
        assert_eq!(m.knns, array![[5i64], [6]]);
        assert_eq!(m.dists, array![[2.0], [3.0]]);
    }

    #[test]
    fn accepts_scientific_notation_distances() {
        let m = decoded("12:1e-3;4:2.5E2");
        assert_eq!(m.dists, array![[0.001, 250.0]]);
    }

    #[test]
    fn ragged_rows_are_rejected() {
        match parse_results("1:0.1;2:0.2\n3:0.3;4:0.4;5:0.5\n") {
            Err(DecodeError::RaggedResult {
                row,
                expected,
                found,
            }) => {
                assert_eq!((row, expected, found), (2, 2, 3));
            }
            other => panic!("expected RaggedResult, got {:?}", other),
        }
    }

    #[test]
    fn malformed_cell_names_row_and_column() {
        match parse_results("1:0.1;2:0.2\n3:0.3;x:0.4\n") {
            Err(DecodeError::MalformedResultRow { row, column, cell }) => {
                assert_eq!((row, column), (2, 2));
                assert_eq!(cell, "x:0.4");
            }
            other => panic!("expected MalformedResultRow, got {:?}", other),
        }
        assert!(matches!(
            parse_results("7;8:0.1"),
            Err(DecodeError::MalformedResultRow { row: 1, column: 1, .. })
        ));
        assert!(matches!(
            parse_results("7:0.1;"),
            Err(DecodeError::MalformedResultRow { row: 1, column: 2, .. })
        ));
    }

    #[test]
    fn header_line_is_an_error_not_skipped() {
        let err = parse_results("id;dist\n1:0.5;2:0.7\n").expect_err("header must fail");
        assert!(matches!(
            err,
            DecodeError::MalformedResultRow { row: 1, column: 1, .. }
        ));
    }

    #[test]
    fn distance_keeps_first_colon_split() {
        // "1:0.5:9" splits into id "1" and distance "0.5:9", which is not a float.
        assert!(matches!(
            parse_results("1:0.5:9"),
            Err(DecodeError::MalformedResultRow { .. })
        ));
    }

    #[test]
    fn empty_text_yields_no_matrices() {
        assert!(parse_results("").expect("empty ok").is_none());
        assert!(parse_results("\n \n").expect("blank ok").is_none());
    }

    #[test]
    fn metadata_defaults_params_to_empty() {
        let meta = parse_metadata("buildtime:1.5;querytime:0.2").expect("parse");
        assert_eq!(meta.build_time, 1.5);
        assert_eq!(meta.query_time, 0.2);
        assert_eq!(meta.params, "");
    }

    #[test]
    fn metadata_values_keep_later_colons() {
        let meta = parse_metadata("buildtime:10;querytime:2.25;params:ef=64:m=16\n")
            .expect("parse");
        assert_eq!(meta.params, "ef=64:m=16");
        let pairs = parse_pairs("a:b:c;d:").expect("pairs");
        assert_eq!(pairs["a"], "b:c");
        assert_eq!(pairs["d"], "");
    }

    #[test]
    fn metadata_missing_buildtime_is_malformed() {
        let err = parse_metadata("querytime:0.2;params:x").expect_err("missing buildtime");
        assert!(err.contains("buildtime"), "{}", err);
        assert!(parse_metadata("buildtime:abc;querytime:1").is_err());
        assert!(parse_metadata("buildtime;querytime:1").is_err());
    }

    #[test]
    fn decode_reads_both_files() {
        let dir = std::env::temp_dir().join(format!(
            "harness_decode_{}_{}",
            std::process::id(),
            chrono::Utc::now().timestamp_micros()
        ));
        harness_core::ensure_dir(&dir).expect("scratch dir");
        let meta_path = dir.join("run_params.csv");
        let csv_path = dir.join("result.csv");
        fs::write(&meta_path, "buildtime:3;querytime:1.25;params:nprobe=8").expect("meta");
        fs::write(&csv_path, "4:0.25\n").expect("csv");

        let (meta, m) = decode(&meta_path, &csv_path).expect("decode");
        assert_eq!(meta.params, "nprobe=8");
        assert_eq!(m.knns, array![[4i64]]);

        fs::write(&meta_path, "querytime:1").expect("meta");
        assert!(matches!(
            decode(&meta_path, &csv_path),
            Err(DecodeError::MalformedMetadata { .. })
        ));
        fs::write(&meta_path, "buildtime:1;querytime:1").expect("meta");
        fs::write(&csv_path, "").expect("csv");
        assert!(matches!(
            decode(&meta_path, &csv_path),
            Err(DecodeError::EmptyResult(_))
        ));
        let _ = fs::remove_dir_all(dir);
    }
}
