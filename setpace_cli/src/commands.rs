//! Line commands accepted by `setpace run`.
//!
//! Exercise, set and round numbers are 1-based on the command line and
//! converted to indices here.

use setpace_core::{Error, Result, SetField};

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Start,
    Pause,
    Status,
    Wait(u64),
    Count { exercise: usize, delta: i64 },
    Reps { exercise: usize, text: String },
    Stage { exercise: usize, text: String },
    Weight { exercise: usize, text: String },
    Done { exercise: usize, value: Option<u32>, skip_rest: bool },
    Edit { exercise: usize, set: usize },
    Update { exercise: usize, set: usize, field: SetField, text: String },
    Undo { exercise: usize, set: usize },
    Close,
    Round { group: String, rest: Option<u32> },
    Skip,
    Timer { exercise: usize },
    Ok(u32),
    Fail(u32),
    Clear(u32),
    Note(String),
    Finish,
    Abandon,
    Help,
}

pub const HELP: &str = "\
Commands (exercise, set and round numbers start at 1):
  start | pause | status | wait <secs>
  count <ex> <+n|-n>        add to the counted reps
  reps <ex> <n>             overwrite the counted reps
  stage <ex> <value>        value for the next set
  weight <ex> <weight>      weight for the next set
  done <ex> [value] [--no-rest]
  edit <ex> <set> | close
  update <ex> <set> value|weight <input>
  undo <ex> <set>           remove the last set (must be editing it)
  round <group> [rest]      complete one round of a group
  skip                      skip the current rest
  timer <ex>                start/cancel a work timer
  ok <round> | fail <round> | clear <round>
  note <text>
  finish | abandon | help";

fn invalid(msg: impl Into<String>) -> Error {
    Error::Action(msg.into())
}

/// 1-based number to index
fn index(token: Option<&str>, what: &str) -> Result<usize> {
    let token = token.ok_or_else(|| invalid(format!("Missing {} number", what)))?;
    match token.parse::<usize>() {
        Ok(n) if n >= 1 => Ok(n - 1),
        _ => Err(invalid(format!("Invalid {} number '{}'", what, token))),
    }
}

fn round(token: Option<&str>) -> Result<u32> {
    let token = token.ok_or_else(|| invalid("Missing round number"))?;
    token
        .parse::<u32>()
        .map_err(|_| invalid(format!("Invalid round number '{}'", token)))
}

fn rest_of<'a>(tokens: impl Iterator<Item = &'a str>) -> String {
    tokens.collect::<Vec<_>>().join(" ")
}

/// Parse one input line. Blank lines and `#` comments yield `None`.
pub fn parse(line: &str) -> Result<Option<Command>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let mut tokens = line.split_whitespace();
    let Some(word) = tokens.next() else {
        return Ok(None);
    };

    let command = match word.to_lowercase().as_str() {
        "start" => Command::Start,
        "pause" => Command::Pause,
        "status" | "s" => Command::Status,
        "wait" => {
            let token = tokens.next().ok_or_else(|| invalid("Missing seconds"))?;
            let secs = token
                .parse()
                .map_err(|_| invalid(format!("Invalid seconds '{}'", token)))?;
            Command::Wait(secs)
        }
        "count" => {
            let exercise = index(tokens.next(), "exercise")?;
            let token = tokens.next().ok_or_else(|| invalid("Missing count delta"))?;
            let delta = token
                .trim_start_matches('+')
                .parse()
                .map_err(|_| invalid(format!("Invalid count delta '{}'", token)))?;
            Command::Count { exercise, delta }
        }
        "reps" => Command::Reps {
            exercise: index(tokens.next(), "exercise")?,
            text: rest_of(tokens),
        },
        "stage" => Command::Stage {
            exercise: index(tokens.next(), "exercise")?,
            text: rest_of(tokens),
        },
        "weight" => Command::Weight {
            exercise: index(tokens.next(), "exercise")?,
            text: rest_of(tokens),
        },
        "done" => {
            let exercise = index(tokens.next(), "exercise")?;
            let mut value = None;
            let mut skip_rest = false;
            for token in tokens {
                if token == "--no-rest" {
                    skip_rest = true;
                } else {
                    value = Some(
                        token
                            .parse()
                            .map_err(|_| invalid(format!("Invalid set value '{}'", token)))?,
                    );
                }
            }
            Command::Done {
                exercise,
                value,
                skip_rest,
            }
        }
        "edit" => Command::Edit {
            exercise: index(tokens.next(), "exercise")?,
            set: index(tokens.next(), "set")?,
        },
        "update" => {
            let exercise = index(tokens.next(), "exercise")?;
            let set = index(tokens.next(), "set")?;
            let field = match tokens.next() {
                Some("value") | Some("reps") => SetField::Value,
                Some("weight") => SetField::Weight,
                other => {
                    return Err(invalid(format!(
                        "Expected 'value' or 'weight', got '{}'",
                        other.unwrap_or("")
                    )))
                }
            };
            Command::Update {
                exercise,
                set,
                field,
                text: rest_of(tokens),
            }
        }
        "undo" => Command::Undo {
            exercise: index(tokens.next(), "exercise")?,
            set: index(tokens.next(), "set")?,
        },
        "close" => Command::Close,
        "round" => {
            let group = tokens
                .next()
                .ok_or_else(|| invalid("Missing group name"))?
                .to_string();
            let rest = match tokens.next() {
                Some(token) => Some(
                    token
                        .parse()
                        .map_err(|_| invalid(format!("Invalid rest '{}'", token)))?,
                ),
                None => None,
            };
            Command::Round { group, rest }
        }
        "skip" => Command::Skip,
        "timer" => Command::Timer {
            exercise: index(tokens.next(), "exercise")?,
        },
        "ok" => Command::Ok(round(tokens.next())?),
        "fail" => Command::Fail(round(tokens.next())?),
        "clear" => Command::Clear(round(tokens.next())?),
        "note" => Command::Note(rest_of(tokens)),
        "finish" => Command::Finish,
        "abandon" | "quit" => Command::Abandon,
        "help" | "?" => Command::Help,
        other => return Err(invalid(format!("Unknown command '{}'. Try 'help'.", other))),
    };

    Ok(Some(command))
}
