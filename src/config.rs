use std::{fmt, time::Duration};

use clap::Parser;

pub const DEFAULT_NUMBER_OF_PHILOSOPHERS: usize = 4;

/// 1 人あたりの食事 (と会話) の回数
pub const DINING_STEPS: usize = 10;

pub const DEFAULT_MAX_PAUSE_MS: u64 = 20;

#[derive(Debug, Parser)]
#[command(
    name = "dining-philosophers",
    version,
    about = "Philosophers sharing chopsticks and the floor around a round table"
)]
pub struct Cli {
    /// Number of philosophers (only the first value is used)
    // "-abc" のような値も clap で弾かずに resolve_count で既定値へ戻す
    #[arg(value_name = "PHILOSOPHERS", allow_hyphen_values = true)]
    pub args: Vec<String>,

    /// Courses each philosopher eats and talks before leaving
    #[arg(long, default_value_t = DINING_STEPS, value_parser = parse_steps)]
    pub steps: usize,

    /// Upper bound of each thinking, eating and talking pause in milliseconds
    #[arg(long, default_value_t = DEFAULT_MAX_PAUSE_MS)]
    pub max_pause_ms: u64,

    /// Hide per-philosopher status lines unless RUST_LOG says otherwise
    #[arg(short, long)]
    pub quiet: bool,
}

fn parse_steps(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) => Err("must be at least 1".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}

/// 人数の引数を解釈した結果、利用者に伝えること
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Default,
    TooManyArguments,
    Accepted(usize),
    NotPositive(String),
    Invalid(String),
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::Default => write!(
                f,
                "Default number of philosophers ( = {DEFAULT_NUMBER_OF_PHILOSOPHERS} ) will be used."
            ),
            Notice::TooManyArguments => {
                write!(f, "Too many arguments, only the first one will be taken.")
            }
            Notice::Accepted(n) => write!(
                f,
                "Valid argument, the number of philosophers will be set to {n}."
            ),
            Notice::NotPositive(arg) => write!(
                f,
                "\"{arg}\" is not a positive decimal integer, the number of philosophers will be set to {DEFAULT_NUMBER_OF_PHILOSOPHERS} by default.\nUsage: dining-philosophers [{DEFAULT_NUMBER_OF_PHILOSOPHERS}]"
            ),
            Notice::Invalid(arg) => write!(
                f,
                "Invalid argument \"{arg}\", the number of philosophers will be set to {DEFAULT_NUMBER_OF_PHILOSOPHERS} by default."
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountChoice {
    pub count: usize,
    pub notices: Vec<Notice>,
}

/// 人数の引数を解釈する。不正な値はエラーにせず既定値に戻す
pub fn resolve_count(args: &[String]) -> CountChoice {
    let mut notices = Vec::new();

    let Some(first) = args.first() else {
        notices.push(Notice::Default);
        return CountChoice {
            count: DEFAULT_NUMBER_OF_PHILOSOPHERS,
            notices,
        };
    };

    if args.len() > 1 {
        notices.push(Notice::TooManyArguments);
    }

    let count = match first.parse::<i64>() {
        Ok(n) if n > 0 => match usize::try_from(n) {
            Ok(n) => {
                notices.push(Notice::Accepted(n));
                n
            }
            Err(_) => {
                notices.push(Notice::Invalid(first.clone()));
                DEFAULT_NUMBER_OF_PHILOSOPHERS
            }
        },
        Ok(_) => {
            notices.push(Notice::NotPositive(first.clone()));
            DEFAULT_NUMBER_OF_PHILOSOPHERS
        }
        Err(_) => {
            notices.push(Notice::Invalid(first.clone()));
            DEFAULT_NUMBER_OF_PHILOSOPHERS
        }
    };

    CountChoice { count, notices }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub philosophers: usize,
    pub steps: usize,
    pub max_pause: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            philosophers: DEFAULT_NUMBER_OF_PHILOSOPHERS,
            steps: DINING_STEPS,
            max_pause: Duration::from_millis(DEFAULT_MAX_PAUSE_MS),
        }
    }
}

impl Config {
    /// Cli から設定を作る。人数の解釈で出たお知らせも一緒に返す
    pub fn from_cli(cli: &Cli) -> (Self, Vec<Notice>) {
        let choice = resolve_count(&cli.args);
        let config = Config {
            philosophers: choice.count,
            steps: cli.steps,
            max_pause: Duration::from_millis(cli.max_pause_ms),
        };
        (config, choice.notices)
    }
}
