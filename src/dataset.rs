//! Schema validation and typed parsing of DMS tables.

use csv::{ReaderBuilder, StringRecord};
use dms_protocol::{DmsError, ErrorCode, Measurement, Observation, REQUIRED_COLUMNS};
use std::collections::{HashMap, HashSet};

const UNDEFINED_MARKERS: [&str; 6] = ["", "na", "nan", "null", "none", "n/a"];

/// The rows of one upload. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    source: String,
    observations: Vec<Observation>,
}

impl Dataset {
    /// Checks the uniqueness invariant; does not reject an empty row set.
    pub fn from_observations(
        source: impl Into<String>,
        observations: Vec<Observation>,
    ) -> Result<Self, DmsError> {
        {
            let mut seen: HashSet<(&str, i64, char)> = HashSet::with_capacity(observations.len());
            for o in &observations {
                if !seen.insert((o.target.as_str(), o.position, o.mutant)) {
                    return Err(DmsError::new(
                        ErrorCode::Load,
                        format!(
                            "Duplicate observation for target '{}' at position {} with mutant '{}'",
                            o.target, o.position, o.mutant
                        ),
                    ));
                }
            }
        }
        Ok(Self {
            source: source.into(),
            observations,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn rows_for<'a>(&'a self, background: &'a str) -> impl Iterator<Item = &'a Observation> {
        self.observations
            .iter()
            .filter(move |o| o.target == background)
    }

    pub fn has_background(&self, background: &str) -> bool {
        self.observations.iter().any(|o| o.target == background)
    }
}

/// Column indices of the required header names.
struct ColumnMap {
    target: usize,
    wildtype: usize,
    position: usize,
    mutant: usize,
    mutation: usize,
    bind: usize,
    delta_bind: usize,
    n_bc_bind: usize,
}

impl ColumnMap {
    fn from_header(header: &StringRecord) -> Result<Self, DmsError> {
        let index: HashMap<&str, usize> = header
            .iter()
            .enumerate()
            .map(|(i, name)| (name.trim(), i))
            .collect();
        let missing = REQUIRED_COLUMNS
            .iter()
            .filter(|name| !index.contains_key(*name))
            .map(|name| name.to_string())
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            return Err(DmsError::missing_columns(missing));
        }
        let at = |name: &str| index[name];
        Ok(Self {
            target: at("target"),
            wildtype: at("wildtype"),
            position: at("position"),
            mutant: at("mutant"),
            mutation: at("mutation"),
            bind: at("bind"),
            delta_bind: at("delta_bind"),
            n_bc_bind: at("n_bc_bind"),
        })
    }
}

fn bad_value(line: usize, column: &str, detail: String) -> DmsError {
    DmsError::new(
        ErrorCode::Load,
        format!("Line {line}, column '{column}': {detail}"),
    )
}

fn cell<'a>(record: &'a StringRecord, idx: usize) -> &'a str {
    record.get(idx).unwrap_or("").trim()
}

fn is_undefined_marker(text: &str) -> bool {
    UNDEFINED_MARKERS.contains(&text.to_ascii_lowercase().as_str())
}

fn parse_residue(text: &str, line: usize, column: &str) -> Result<char, DmsError> {
    let mut chars = text.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => Err(bad_value(
            line,
            column,
            format!("expected a single residue code, found '{text}'"),
        )),
    }
}

fn parse_position(text: &str, line: usize) -> Result<i64, DmsError> {
    text.parse::<i64>()
        .map_err(|e| bad_value(line, "position", format!("'{text}' is not an integer: {e}")))
}

fn parse_measurement(text: &str, line: usize, column: &str) -> Result<Measurement, DmsError> {
    if is_undefined_marker(text) {
        return Ok(Measurement::Undefined);
    }
    text.parse::<f64>()
        .map(Measurement::new)
        .map_err(|e| bad_value(line, column, format!("'{text}' is not a number: {e}")))
}

fn parse_count(text: &str, line: usize) -> Result<Option<u32>, DmsError> {
    if is_undefined_marker(text) {
        return Ok(None);
    }
    if let Ok(n) = text.parse::<u32>() {
        return Ok(Some(n));
    }
    // Counts come out as "12.0" once a column held a missing value upstream.
    match text.parse::<f64>() {
        Ok(v) if v.fract() == 0.0 && v >= 0.0 && v <= f64::from(u32::MAX) => Ok(Some(v as u32)),
        _ => Err(bad_value(
            line,
            "n_bc_bind",
            format!("'{text}' is not a non-negative integer count"),
        )),
    }
}

fn parse_record(record: &StringRecord, cols: &ColumnMap, line: usize) -> Result<Observation, DmsError> {
    let target = cell(record, cols.target);
    if target.is_empty() {
        return Err(bad_value(line, "target", "empty background identifier".to_string()));
    }
    Ok(Observation {
        target: target.to_string(),
        wildtype: parse_residue(cell(record, cols.wildtype), line, "wildtype")?,
        position: parse_position(cell(record, cols.position), line)?,
        mutant: parse_residue(cell(record, cols.mutant), line, "mutant")?,
        mutation: cell(record, cols.mutation).to_string(),
        bind: parse_measurement(cell(record, cols.bind), line, "bind")?,
        delta_bind: parse_measurement(cell(record, cols.delta_bind), line, "delta_bind")?,
        n_bc_bind: parse_count(cell(record, cols.n_bc_bind), line)?,
    })
}

/// Validates and parses comma-separated text with a header row.
///
/// The header is checked before any row is read, so a header-only file missing
/// a column reports the schema problem rather than the empty body.
pub fn parse_csv(source: &str, bytes: &[u8]) -> Result<Dataset, DmsError> {
    let mut rdr = ReaderBuilder::new().has_headers(true).from_reader(bytes);
    let header = rdr
        .headers()
        .map_err(|e| DmsError::new(ErrorCode::Load, format!("Could not read CSV header of '{source}': {e}")))?
        .clone();
    let cols = ColumnMap::from_header(&header)?;

    let mut observations = Vec::new();
    for result in rdr.records() {
        let record = result.map_err(|e| {
            DmsError::new(ErrorCode::Load, format!("Bad CSV record in '{source}': {e}"))
        })?;
        // Quoted fields may span lines, so the reader's own line count is used.
        let line = record
            .position()
            .and_then(|p| usize::try_from(p.line()).ok())
            .unwrap_or_default();
        observations.push(parse_record(&record, &cols, line)?);
    }
    if observations.is_empty() {
        return Err(DmsError::new(
            ErrorCode::EmptyDataset,
            format!("'{source}' has a valid header but no data rows"),
        ));
    }
    Dataset::from_observations(source, observations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dms_protocol::Metric;

    const HEADER: &str = "target,wildtype,position,mutant,mutation,bind,delta_bind,n_bc_bind";

    fn csv_of(rows: &[&str]) -> String {
        let mut text = HEADER.to_string();
        for row in rows {
            text.push('\n');
            text.push_str(row);
        }
        text.push('\n');
        text
    }

    #[test]
    fn parses_fixture() {
        let text = include_str!("../test_files/dms_small.csv");
        let ds = parse_csv("dms_small.csv", text.as_bytes()).expect("parse fixture");
        assert_eq!(ds.source(), "dms_small.csv");
        assert!(ds.len() > 10);
        assert!(ds.observations().iter().any(|o| o.is_wildtype()));
    }

    #[test]
    fn header_only_is_empty_dataset() {
        let err = parse_csv("x", csv_of(&[]).as_bytes()).unwrap_err();
        assert_eq!(err.code, ErrorCode::EmptyDataset);
    }

    #[test]
    fn missing_bind_is_schema_error_naming_bind() {
        let text = "target,wildtype,position,mutant,mutation,delta_bind,n_bc_bind\nA,N,501,Y,N501Y,0.1,3\n";
        let err = parse_csv("x", text.as_bytes()).unwrap_err();
        assert_eq!(err.code, ErrorCode::Schema);
        assert_eq!(err.columns, vec!["bind".to_string()]);
    }

    #[test]
    fn schema_error_lists_all_missing_in_canonical_order() {
        let text = "position,target,bind\n";
        let err = parse_csv("x", text.as_bytes()).unwrap_err();
        assert_eq!(
            err.columns,
            vec!["wildtype", "mutant", "mutation", "delta_bind", "n_bc_bind"]
        );
    }

    #[test]
    fn column_order_and_extra_columns_are_free() {
        let text = "extra,n_bc_bind,delta_bind,bind,mutation,mutant,position,wildtype,target\n\
                    q,4,0.5,-1.25,N501Y,Y,501,N,Omicron_BA1\n";
        let ds = parse_csv("x", text.as_bytes()).expect("parse");
        let o = &ds.observations()[0];
        assert_eq!(o.target, "Omicron_BA1");
        assert_eq!(o.position, 501);
        assert_eq!(o.bind, Measurement::Defined(-1.25));
        assert_eq!(o.n_bc_bind, Some(4));
    }

    #[test]
    fn missing_values_are_undefined_not_zero() {
        let text = csv_of(&["A,N,501,Y,N501Y,,NA,", "A,N,501,F,N501F,0,nan,7.0"]);
        let ds = parse_csv("x", text.as_bytes()).expect("parse");
        let rows = ds.observations();
        assert_eq!(rows[0].bind, Measurement::Undefined);
        assert_eq!(rows[0].delta_bind, Measurement::Undefined);
        assert_eq!(rows[0].n_bc_bind, None);
        assert_eq!(rows[1].bind, Measurement::Defined(0.0));
        assert_eq!(rows[1].n_bc_bind, Some(7));
    }

    #[test]
    fn key_columns_are_not_coerced() {
        let err = parse_csv("x", csv_of(&["A,N,501.5,Y,N501Y,0,0,1"]).as_bytes()).unwrap_err();
        assert_eq!(err.code, ErrorCode::Load);
        assert!(err.message.contains("position"), "{}", err.message);

        let err = parse_csv("x", csv_of(&["A,N,501,YF,N501YF,0,0,1"]).as_bytes()).unwrap_err();
        assert!(err.message.contains("mutant"), "{}", err.message);

        let err = parse_csv("x", csv_of(&[",N,501,Y,N501Y,0,0,1"]).as_bytes()).unwrap_err();
        assert!(err.message.contains("target"), "{}", err.message);
    }

    #[test]
    fn non_numeric_score_is_load_error() {
        let err = parse_csv("x", csv_of(&["A,N,501,Y,N501Y,high,0,1"]).as_bytes()).unwrap_err();
        assert_eq!(err.code, ErrorCode::Load);
        assert!(err.message.starts_with("Line 2"), "{}", err.message);
    }

    #[test]
    fn error_line_counts_quoted_newlines() {
        let text = csv_of(&[
            "A,N,501,Y,\"N501Y\nescape\",0,0,1",
            "A,N,502,Y,N502Y,high,0,1",
        ]);
        let err = parse_csv("x", text.as_bytes()).unwrap_err();
        assert!(err.message.starts_with("Line 4"), "{}", err.message);
    }

    #[test]
    fn infinite_scores_are_undefined() {
        let text = csv_of(&[
            "A,N,501,Y,N501Y,inf,0,1",
            "B,N,501,Y,N501Y,inf,0,1",
            "B,N,502,Y,N502Y,-Infinity,0,1",
        ]);
        let ds = parse_csv("x", text.as_bytes()).expect("parse");
        assert!(ds.observations().iter().all(|o| !o.bind.is_defined()));

        let pairs =
            crate::comparison::build_comparison(&ds, "A", "B", Metric::Bind, 501).expect("join");
        assert_eq!(pairs.len(), 1);
        let err = crate::stats::summarize_observations(&pairs).unwrap_err();
        assert_eq!(err.code, ErrorCode::InsufficientData);
    }

    #[test]
    fn duplicate_key_is_rejected() {
        let text = csv_of(&["A,N,501,Y,N501Y,0,0,1", "A,N,501,Y,N501Y,1,1,1"]);
        let err = parse_csv("x", text.as_bytes()).unwrap_err();
        assert_eq!(err.code, ErrorCode::Load);
        assert!(err.message.contains("Duplicate"));
    }

    #[test]
    fn ragged_rows_are_load_errors() {
        let err = parse_csv("x", csv_of(&["A,N,501,Y"]).as_bytes()).unwrap_err();
        assert_eq!(err.code, ErrorCode::Load);
    }
}
