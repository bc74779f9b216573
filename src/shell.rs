use crate::session::{Engine, Operation, Session};
use dms_protocol::{DmsError, ErrorCode, Metric};
use serde_json::{Value, json};
use std::fs;

#[derive(Debug, Clone, PartialEq)]
pub enum ShellCommand {
    Help,
    Capabilities,
    Summary,
    Load {
        source: String,
    },
    Backgrounds,
    Range,
    Pairs,
    Heatmap {
        background: String,
        center: i64,
        interval_size: u32,
    },
    Compare {
        background_a: String,
        background_b: String,
        position: i64,
        metric: Option<Metric>,
    },
    Set {
        name: String,
        value: Value,
    },
    ClearCache,
    Op {
        payload: String,
    },
}

pub fn shell_help_text() -> &'static str {
    "DMS-Heatmap shell commands:\n\
help\n\
capabilities\n\
summary\n\
load PATH_OR_URL\n\
backgrounds\n\
range\n\
pairs\n\
heatmap BACKGROUND CENTER SIZE\n\
compare BACKGROUND_A BACKGROUND_B POSITION [--metric bind|delta_bind|n_bc_bind]\n\
set NAME JSON_VALUE\n\
clear-cache\n\
op <operation-json-or-@file>"
}

fn parse_json_payload(raw: &str) -> Result<String, String> {
    if let Some(path) = raw.strip_prefix('@') {
        fs::read_to_string(path).map_err(|e| format!("Could not read JSON file '{path}': {e}"))
    } else {
        Ok(raw.to_string())
    }
}

fn token_error(command: &str) -> String {
    format!("Invalid '{command}' usage. Try: help")
}

fn parse_int<T: std::str::FromStr>(raw: &str, what: &str) -> Result<T, String>
where
    T::Err: std::fmt::Display,
{
    raw.parse::<T>()
        .map_err(|e| format!("Invalid {what} '{raw}': {e}"))
}

fn no_args(tokens: &[String], command: ShellCommand) -> Result<ShellCommand, String> {
    if tokens.len() == 1 {
        Ok(command)
    } else {
        Err(token_error(&tokens[0]))
    }
}

pub fn parse_shell_tokens(tokens: &[String]) -> Result<ShellCommand, String> {
    if tokens.is_empty() {
        return Err("Missing shell command".to_string());
    }
    let cmd = tokens[0].as_str();
    match cmd {
        "help" | "-h" | "--help" => Ok(ShellCommand::Help),
        "capabilities" => no_args(tokens, ShellCommand::Capabilities),
        "summary" => no_args(tokens, ShellCommand::Summary),
        "backgrounds" => no_args(tokens, ShellCommand::Backgrounds),
        "range" => no_args(tokens, ShellCommand::Range),
        "pairs" => no_args(tokens, ShellCommand::Pairs),
        "clear-cache" => no_args(tokens, ShellCommand::ClearCache),
        "load" => {
            if tokens.len() == 2 {
                Ok(ShellCommand::Load {
                    source: tokens[1].clone(),
                })
            } else {
                Err(token_error(cmd))
            }
        }
        "heatmap" => {
            if tokens.len() != 4 {
                return Err(token_error(cmd));
            }
            Ok(ShellCommand::Heatmap {
                background: tokens[1].clone(),
                center: parse_int(&tokens[2], "center")?,
                interval_size: parse_int(&tokens[3], "interval size")?,
            })
        }
        "compare" => {
            if tokens.len() < 4 {
                return Err(token_error(cmd));
            }
            let mut metric = None;
            let mut idx = 4usize;
            while idx < tokens.len() {
                match tokens[idx].as_str() {
                    "--metric" => {
                        let raw = tokens
                            .get(idx + 1)
                            .ok_or_else(|| "Missing value after --metric".to_string())?;
                        metric = Some(raw.parse::<Metric>().map_err(|e| e.message)?);
                        idx += 2;
                    }
                    other => {
                        return Err(format!("Unknown argument '{other}' for compare"));
                    }
                }
            }
            Ok(ShellCommand::Compare {
                background_a: tokens[1].clone(),
                background_b: tokens[2].clone(),
                position: parse_int(&tokens[3], "position")?,
                metric,
            })
        }
        "set" => {
            if tokens.len() != 3 {
                return Err(token_error(cmd));
            }
            // Bare words are taken as strings so `set heatmap_metric bind` works.
            let value = serde_json::from_str(&tokens[2])
                .unwrap_or_else(|_| Value::String(tokens[2].clone()));
            Ok(ShellCommand::Set {
                name: tokens[1].clone(),
                value,
            })
        }
        "op" => {
            let payload = tokens[1..].join(" ");
            if payload.trim().is_empty() {
                return Err("Missing operation JSON".to_string());
            }
            Ok(ShellCommand::Op { payload })
        }
        other => Err(format!("Unknown shell command '{other}'. Try: help")),
    }
}

pub fn parse_shell_line(line: &str) -> Result<ShellCommand, String> {
    // Operation JSON is passed through verbatim; word splitting would strip its quotes.
    let trimmed = line.trim();
    if let Some(rest) = trimmed
        .strip_prefix("op")
        .filter(|rest| rest.starts_with(char::is_whitespace))
    {
        return Ok(ShellCommand::Op {
            payload: rest.trim().to_string(),
        });
    }
    let tokens = split_shell_words(line)?;
    parse_shell_tokens(&tokens)
}

/// Splits a command line into words.
///
/// Single quotes are literal, double quotes honor backslash escapes and `''`
/// yields an empty word.
pub fn split_shell_words(line: &str) -> Result<Vec<String>, String> {
    let mut words = Vec::new();
    let mut word: Option<String> = None;
    let mut quote: Option<char> = None;
    let mut chars = line.chars();
    while let Some(ch) = chars.next() {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some('\''), c) => word.get_or_insert_with(String::new).push(c),
            (_, '\\') => {
                if let Some(next) = chars.next() {
                    word.get_or_insert_with(String::new).push(next);
                }
            }
            (Some(_), c) => word.get_or_insert_with(String::new).push(c),
            (None, '\'' | '"') => {
                quote = Some(ch);
                word.get_or_insert_with(String::new);
            }
            (None, c) if c.is_whitespace() => words.extend(word.take()),
            (None, c) => word.get_or_insert_with(String::new).push(c),
        }
    }
    if quote.is_some() {
        return Err("Unterminated quoted string in shell command".to_string());
    }
    words.extend(word);
    if words.is_empty() {
        return Err("Empty shell command".to_string());
    }
    Ok(words)
}

fn to_json<T: serde::Serialize>(value: &T, what: &str) -> Result<Value, DmsError> {
    serde_json::to_value(value).map_err(|e| {
        DmsError::new(ErrorCode::Internal, format!("Could not serialize {what}: {e}"))
    })
}

fn run_op(session: &mut Session, op: Operation) -> Result<Value, DmsError> {
    let result = session.apply(op)?;
    to_json(&result, "operation result")
}

/// Runs one command; failures keep their `ErrorCode` so callers can branch on it.
pub fn execute_shell_command(
    session: &mut Session,
    command: &ShellCommand,
) -> Result<Value, DmsError> {
    let output = match command {
        ShellCommand::Help => json!({ "help": shell_help_text() }),
        ShellCommand::Capabilities => to_json(&Session::capabilities(), "capabilities")?,
        ShellCommand::Summary => {
            to_json(&session.summary()?, "summary")?
        }
        ShellCommand::Load { source } => run_op(
            session,
            Operation::Load {
                source: source.clone(),
            },
        )?,
        ShellCommand::Backgrounds => run_op(session, Operation::ListBackgrounds)?,
        ShellCommand::Range => run_op(session, Operation::PositionRange)?,
        ShellCommand::Pairs => run_op(session, Operation::ComparisonPairs)?,
        ShellCommand::Heatmap {
            background,
            center,
            interval_size,
        } => run_op(
            session,
            Operation::PrepareHeatmap {
                background: background.clone(),
                center: *center,
                interval_size: *interval_size,
            },
        )?,
        ShellCommand::Compare {
            background_a,
            background_b,
            position,
            metric,
        } => run_op(
            session,
            Operation::BuildComparison {
                background_a: background_a.clone(),
                background_b: background_b.clone(),
                metric: *metric,
                position: *position,
            },
        )?,
        ShellCommand::Set { name, value } => run_op(
            session,
            Operation::SetParameter {
                name: name.clone(),
                value: value.clone(),
            },
        )?,
        ShellCommand::ClearCache => run_op(session, Operation::ClearCache)?,
        ShellCommand::Op { payload } => {
            let json_text = parse_json_payload(payload)
                .map_err(|e| DmsError::new(ErrorCode::Io, e))?;
            let op: Operation = serde_json::from_str(&json_text).map_err(|e| {
                DmsError::new(ErrorCode::InvalidInput, format!("Invalid operation JSON: {e}"))
            })?;
            run_op(session, op)?
        }
    };
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loaded() -> Session {
        let mut session = Session::new();
        execute_shell_command(
            &mut session,
            &parse_shell_line("load test_files/dms_small.csv").expect("parse load"),
        )
        .expect("load fixture");
        session
    }

    #[test]
    fn parse_compare_with_metric() {
        let cmd = parse_shell_line("compare 'Wuhan Hu 1' Omicron_BA1 501 --metric delta_bind")
            .expect("parse compare");
        assert_eq!(
            cmd,
            ShellCommand::Compare {
                background_a: "Wuhan Hu 1".to_string(),
                background_b: "Omicron_BA1".to_string(),
                position: 501,
                metric: Some(Metric::DeltaBind),
            }
        );
    }

    #[test]
    fn parse_rejects_bad_numbers_and_flags() {
        assert!(parse_shell_line("heatmap A five 10").is_err());
        assert!(parse_shell_line("heatmap A 500 -2").is_err());
        assert!(parse_shell_line("compare A B 501 --metric").is_err());
        assert!(parse_shell_line("compare A B 501 --color red").is_err());
        assert!(parse_shell_line("backgrounds extra").is_err());
        assert!(parse_shell_line("plot").is_err());
        assert!(parse_shell_line("load \"unterminated").is_err());
    }

    #[test]
    fn parse_set_accepts_bare_words_and_json() {
        assert_eq!(
            parse_shell_line("set heatmap_metric bind").unwrap(),
            ShellCommand::Set {
                name: "heatmap_metric".to_string(),
                value: Value::String("bind".to_string()),
            }
        );
        assert_eq!(
            parse_shell_line("set max_interval_size 60").unwrap(),
            ShellCommand::Set {
                name: "max_interval_size".to_string(),
                value: json!(60),
            }
        );
    }

    #[test]
    fn parse_op_payload_is_verbatim_json() {
        let cmd = parse_shell_line("op { \"SetWindow\": { \"center\": 500, \"interval_size\": 20 } }")
            .expect("op command parse");
        match cmd {
            ShellCommand::Op { payload } => {
                let op: Operation = serde_json::from_str(&payload).expect("operation json");
                assert_eq!(
                    op,
                    Operation::SetWindow {
                        center: 500,
                        interval_size: 20
                    }
                );
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn execute_backgrounds_returns_json() {
        let mut session = loaded();
        let out = execute_shell_command(&mut session, &ShellCommand::Backgrounds)
            .expect("execute backgrounds");
        assert_eq!(
            out["output"]["Backgrounds"],
            json!(["Wuhan_Hu_1", "Omicron_BA1", "Omicron_BA2"])
        );
    }

    #[test]
    fn execute_compare_reports_typed_statistic_error() {
        let mut session = loaded();
        let cmd = parse_shell_line("compare Omicron_BA1 Omicron_BA2 503").unwrap();
        let out = execute_shell_command(&mut session, &cmd).expect("compare");
        let view = &out["output"]["Comparison"];
        assert_eq!(view["pairs"], json!([]));
        assert_eq!(view["statistic_error"]["code"], "InsufficientData");
    }

    #[test]
    fn execute_compare_same_background_fails() {
        let mut session = loaded();
        let cmd = parse_shell_line("compare Omicron_BA1 Omicron_BA1 501").unwrap();
        let err = execute_shell_command(&mut session, &cmd).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidComparison);
        let json = serde_json::to_value(&err).expect("serialize error");
        assert_eq!(json["code"], "InvalidComparison");
    }

    #[test]
    fn bad_operation_json_is_invalid_input() {
        let mut session = Session::new();
        let cmd = parse_shell_line("op {\"Frobnicate\":{}}").expect("parse op");
        let err = execute_shell_command(&mut session, &cmd).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidInput);
    }

    #[test]
    fn split_words_handles_quotes_and_escapes() {
        assert_eq!(
            split_shell_words(r#"load 'my data.csv'"#).unwrap(),
            vec!["load", "my data.csv"]
        );
        assert_eq!(
            split_shell_words(r#"set name "a \"b\"" ''"#).unwrap(),
            vec!["set", "name", "a \"b\"", ""]
        );
        assert_eq!(split_shell_words(r"a\ b  c").unwrap(), vec!["a b", "c"]);
        assert_eq!(split_shell_words(r"'\x'").unwrap(), vec![r"\x"]);
        assert!(split_shell_words("   ").is_err());
    }

    #[test]
    fn execute_summary_without_dataset_fails() {
        let mut session = Session::new();
        let err = execute_shell_command(&mut session, &ShellCommand::Summary).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidInput);
    }
}
