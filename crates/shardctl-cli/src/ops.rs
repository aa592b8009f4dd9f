//! Token grammar for chained operation sequences.
//!
//! The command line is a flat word list, not subcommands, so several
//! operations chain in one invocation: `stop build engine start
//! mygame`. Keywords delimit operations; `start`, `restore`, and
//! `sleep` consume one following argument, `build` consumes every
//! following non-keyword token.

use std::time::Duration;

use shardctl_core::builder::BuildTarget;
use shardctl_core::Op;
use thiserror::Error;

pub const USAGE: &str = "\
usage: shardctl [--log <level>] [--detached] <command>...

commands:
  status                 compare running processes against the topology
  start <game>           start dispatcher, then games, then gates
  stop                   stop gates, games (SIGTERM), then dispatcher
  kill                   like stop, but games get SIGKILL
  freeze                 SIGINT games so they persist their state
  restore <game>         restart games from persisted state
  reload                 freeze then restore the running game
  build [<target>...]    build engine components and/or games (default: engine)
  sleep <seconds>        pause between chained commands

commands chain left to right: shardctl stop build engine start mygame";

const KEYWORDS: [&str; 9] = [
    "status", "start", "stop", "kill", "freeze", "restore", "reload", "build", "sleep",
];

/// Command-line grammar errors; all exit with the usage code.
#[derive(Debug, Error, PartialEq)]
pub enum UsageError {
    /// `start` or `restore` without a game name.
    #[error("{command} requires a game name")]
    MissingGame {
        /// The offending command keyword.
        command: &'static str,
    },

    /// `sleep` without a duration.
    #[error("sleep requires a duration in seconds")]
    MissingDuration,

    /// `sleep` with a non-numeric or negative duration.
    #[error("invalid sleep duration: {value}")]
    InvalidDuration {
        /// The rejected token.
        value: String,
    },

    /// A token in command position that is no keyword.
    #[error("unknown command: {command}")]
    UnknownCommand {
        /// The rejected token.
        command: String,
    },
}

/// Parse the word list into an operation sequence.
pub fn parse(tokens: &[String]) -> Result<Vec<Op>, UsageError> {
    let mut ops = Vec::new();
    let mut iter = tokens.iter().peekable();

    while let Some(token) = iter.next() {
        let op = match token.as_str() {
            "status" => Op::Status,
            "start" => Op::Start {
                game: game_arg(iter.next(), "start")?,
            },
            "stop" => Op::Stop,
            "kill" => Op::Kill,
            "freeze" => Op::Freeze,
            "restore" => Op::Restore {
                game: game_arg(iter.next(), "restore")?,
            },
            "reload" => Op::Reload,
            "build" => {
                let mut targets = Vec::new();
                while iter
                    .peek()
                    .is_some_and(|next| !KEYWORDS.contains(&next.as_str()))
                {
                    let Some(target) = iter.next() else { break };
                    targets.push(BuildTarget::parse(target));
                }
                if targets.is_empty() {
                    targets.push(BuildTarget::Engine);
                }
                Op::Build { targets }
            }
            "sleep" => {
                let value = iter.next().ok_or(UsageError::MissingDuration)?;
                Op::Sleep {
                    duration: sleep_duration(value)?,
                }
            }
            other => {
                return Err(UsageError::UnknownCommand {
                    command: other.to_string(),
                })
            }
        };
        ops.push(op);
    }

    Ok(ops)
}

fn game_arg(token: Option<&String>, command: &'static str) -> Result<String, UsageError> {
    token
        .map(String::clone)
        .ok_or(UsageError::MissingGame { command })
}

fn sleep_duration(value: &str) -> Result<Duration, UsageError> {
    let invalid = || UsageError::InvalidDuration {
        value: value.to_string(),
    };
    let seconds: f64 = value.parse().map_err(|_| invalid())?;
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(invalid());
    }
    Ok(Duration::from_secs_f64(seconds))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(line: &str) -> Vec<String> {
        line.split_whitespace().map(str::to_string).collect()
    }

    #[test]
    fn chained_sequence_parses_in_order() {
        let ops = parse(&words("stop build engine start mygame")).unwrap();
        assert_eq!(
            ops,
            vec![
                Op::Stop,
                Op::Build {
                    targets: vec![BuildTarget::Engine],
                },
                Op::Start {
                    game: "mygame".to_string(),
                },
            ]
        );
    }

    #[test]
    fn build_consumes_tokens_until_the_next_keyword() {
        let ops = parse(&words("build gate mygame status")).unwrap();
        assert_eq!(
            ops,
            vec![
                Op::Build {
                    targets: vec![
                        BuildTarget::Gate,
                        BuildTarget::Game("mygame".to_string()),
                    ],
                },
                Op::Status,
            ]
        );
    }

    #[test]
    fn bare_build_defaults_to_engine() {
        let ops = parse(&words("build")).unwrap();
        assert_eq!(
            ops,
            vec![Op::Build {
                targets: vec![BuildTarget::Engine],
            }]
        );
    }

    #[test]
    fn sleep_takes_fractional_seconds() {
        let ops = parse(&words("sleep 0.5 reload")).unwrap();
        assert_eq!(
            ops,
            vec![
                Op::Sleep {
                    duration: Duration::from_millis(500),
                },
                Op::Reload,
            ]
        );
    }

    #[test]
    fn sleep_rejects_garbage_and_negatives() {
        assert_eq!(
            parse(&words("sleep soon")).unwrap_err(),
            UsageError::InvalidDuration {
                value: "soon".to_string(),
            }
        );
        assert_eq!(
            parse(&words("sleep -1")).unwrap_err(),
            UsageError::InvalidDuration {
                value: "-1".to_string(),
            }
        );
        assert_eq!(parse(&words("sleep")).unwrap_err(), UsageError::MissingDuration);
    }

    #[test]
    fn start_and_restore_require_a_game() {
        assert_eq!(
            parse(&words("start")).unwrap_err(),
            UsageError::MissingGame { command: "start" }
        );
        assert_eq!(
            parse(&words("restore")).unwrap_err(),
            UsageError::MissingGame { command: "restore" }
        );
    }

    #[test]
    fn qualified_game_names_pass_through() {
        let ops = parse(&words("restore dir/mygame")).unwrap();
        assert_eq!(
            ops,
            vec![Op::Restore {
                game: "dir/mygame".to_string(),
            }]
        );
    }

    #[test]
    fn unknown_command_is_rejected() {
        assert_eq!(
            parse(&words("status frobnicate")).unwrap_err(),
            UsageError::UnknownCommand {
                command: "frobnicate".to_string(),
            }
        );
    }
}
