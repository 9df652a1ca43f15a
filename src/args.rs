//! These structs provide the CLI interface for the statement-etl CLI.

use crate::dates::DateSelection;
use crate::db::TableName;
use crate::model::Cnpj;
use crate::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::convert::Infallible;
use std::fmt::{Display, Formatter};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::error;
use tracing_subscriber::filter::LevelFilter;

/// statement-etl: Loads fund cash statements into the posting ledger.
///
/// For every closed posting date that is selected, the cash statement of each fund is retrieved
/// from the administrator's statement API, reshaped into ledger rows, and reloaded into the target
/// table so that running the same date twice never duplicates rows.
///
/// The API secrets are read from STATEMENT_API_TOKEN and STATEMENT_API_LOGIN, which may also be
/// placed in a .env file in the working directory.
#[derive(Debug, Parser, Clone)]
pub struct Args {
    #[clap(flatten)]
    common: Common,

    #[command(subcommand)]
    command: Command,
}

impl Args {
    pub fn new(common: Common, command: Command) -> Self {
        Self { common, command }
    }

    pub fn common(&self) -> &Common {
        &self.common
    }

    pub fn command(&self) -> &Command {
        &self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Create the home directory, its config.json and the SQLite ledger.
    ///
    /// This is the first command you should run. Decide where the home directory lives and pass
    /// it as --home (defaults to $HOME/statement-etl), then supply the statement API endpoints and
    /// the CNPJ of the fund administrator whose reference names are used.
    Init(InitArgs),
    /// Extract, transform and reload the statements of the selected posting dates.
    ///
    /// Select the dates with exactly one of --date, --start-date with --end-date, or --days-ago.
    /// With none of them, yesterday is processed.
    Run(RunArgs),
}

/// Arguments common to all subcommands.
#[derive(Debug, Parser, Clone)]
pub struct Common {
    /// The logging verbosity. One of, from least to most verbose:
    /// off, error, warn, info, debug, trace
    ///
    /// This can be overridden by RUST_LOG.
    #[arg(long, default_value_t = LevelFilter::INFO)]
    log_level: LevelFilter,

    /// The directory where configuration, the ledger and staged statements are held. Defaults to
    /// ~/statement-etl
    #[arg(long, env = "STATEMENT_ETL_HOME", default_value_t = default_home())]
    home: DisplayPath,
}

impl Common {
    pub fn new(log_level: LevelFilter, home: PathBuf) -> Self {
        Self {
            log_level,
            home: home.into(),
        }
    }

    pub fn log_level(&self) -> LevelFilter {
        self.log_level
    }

    pub fn home(&self) -> &DisplayPath {
        &self.home
    }
}

/// (Not shown): Args for the `statement-etl init` command.
#[derive(Debug, Parser, Clone)]
pub struct InitArgs {
    /// The endpoint that exchanges the API token and login for a bearer credential.
    #[arg(long)]
    auth_url: String,

    /// The GraphQL endpoint that serves cash statements.
    #[arg(long)]
    graphql_url: String,

    /// The CNPJ of the fund administrator, with or without punctuation.
    #[arg(long)]
    administrator_cnpj: Cnpj,

    /// The table that statement rows are reloaded into.
    #[arg(long, default_value_t = TableName::default())]
    target_table: TableName,
}

impl InitArgs {
    pub fn new(
        auth_url: impl Into<String>,
        graphql_url: impl Into<String>,
        administrator_cnpj: Cnpj,
        target_table: TableName,
    ) -> Self {
        Self {
            auth_url: auth_url.into(),
            graphql_url: graphql_url.into(),
            administrator_cnpj,
            target_table,
        }
    }

    pub fn auth_url(&self) -> &str {
        &self.auth_url
    }

    pub fn graphql_url(&self) -> &str {
        &self.graphql_url
    }

    pub fn administrator_cnpj(&self) -> &Cnpj {
        &self.administrator_cnpj
    }

    pub fn target_table(&self) -> &TableName {
        &self.target_table
    }
}

/// (Not shown): Args for the `statement-etl run` command.
#[derive(Debug, Parser, Clone)]
pub struct RunArgs {
    /// Process this single date (YYYY-MM-DD).
    #[arg(long)]
    date: Option<NaiveDate>,

    /// The first date of an inclusive range (YYYY-MM-DD). Requires --end-date.
    #[arg(long)]
    start_date: Option<NaiveDate>,

    /// The last date of an inclusive range (YYYY-MM-DD). Requires --start-date.
    #[arg(long)]
    end_date: Option<NaiveDate>,

    /// Process the date this many days before today.
    #[arg(long)]
    days_ago: Option<u32>,

    /// Only process these funds. Defaults to every active fund in the ledger.
    #[arg(long = "cnpj")]
    cnpjs: Vec<Cnpj>,

    /// The statement API token.
    #[arg(long, env = "STATEMENT_API_TOKEN", hide_env_values = true)]
    api_token: String,

    /// The statement API login.
    #[arg(long, env = "STATEMENT_API_LOGIN")]
    api_login: String,
}

impl RunArgs {
    /// The date selection these arguments describe.
    ///
    /// # Errors
    /// When more than one selection mode is given or the range is incomplete or inverted.
    pub fn selection(&self) -> Result<DateSelection> {
        DateSelection::from_inputs(self.date, self.start_date, self.end_date, self.days_ago)
    }

    pub fn cnpjs(&self) -> &[Cnpj] {
        &self.cnpjs
    }

    pub fn api_token(&self) -> &str {
        &self.api_token
    }

    pub fn api_login(&self) -> &str {
        &self.api_login
    }
}

fn default_home() -> DisplayPath {
    DisplayPath(match dirs::home_dir() {
        Some(home) => home.join("statement-etl"),
        None => {
            error!(
                "There was an error when trying to get your home directory. You can get around \
                this by providing --home or STATEMENT_ETL_HOME instead of relying on the default \
                home directory. If you continue using the program right now, you may have \
                problems!",
            );
            PathBuf::from("statement-etl")
        }
    })
}

#[derive(Debug, Default, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct DisplayPath(PathBuf);

impl From<PathBuf> for DisplayPath {
    fn from(value: PathBuf) -> Self {
        DisplayPath(value)
    }
}

impl Deref for DisplayPath {
    type Target = Path;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<Path> for DisplayPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl Display for DisplayPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_string_lossy())
    }
}

impl FromStr for DisplayPath {
    type Err = Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(PathBuf::from(s)))
    }
}

impl DisplayPath {
    pub fn path(&self) -> &Path {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> std::result::Result<Args, clap::Error> {
        let mut full = vec!["statement-etl", "--home", "/tmp/etl"];
        full.extend_from_slice(args);
        Args::try_parse_from(full)
    }

    fn run_args(args: &[&str]) -> RunArgs {
        let mut full = vec!["run", "--api-token", "t", "--api-login", "l"];
        full.extend_from_slice(args);
        match parse(&full).unwrap().command() {
            Command::Run(run) => run.clone(),
            other => panic!("expected run, got {other:?}"),
        }
    }

    #[test]
    fn test_init_args() {
        let args = parse(&[
            "init",
            "--auth-url",
            "https://a.example.com/auth",
            "--graphql-url",
            "https://a.example.com/graphql",
            "--administrator-cnpj",
            "22.610.500/0001-88",
        ])
        .unwrap();
        assert_eq!(args.common().home().path(), Path::new("/tmp/etl"));
        assert_eq!(args.common().log_level(), LevelFilter::INFO);
        let Command::Init(init) = args.command() else {
            panic!("expected init");
        };
        assert_eq!(init.administrator_cnpj().digits(), "22610500000188");
        assert_eq!(init.target_table(), &TableName::default());
    }

    #[test]
    fn test_run_args_selection() {
        assert_eq!(run_args(&[]).selection().unwrap(), DateSelection::Lookback(1));
        assert_eq!(
            run_args(&["--days-ago", "3"]).selection().unwrap(),
            DateSelection::Lookback(3)
        );
        assert_eq!(
            run_args(&["--date", "2024-01-05"]).selection().unwrap(),
            DateSelection::Single(NaiveDate::from_ymd_opt(2024, 1, 5).unwrap())
        );
        assert!(run_args(&["--date", "2024-01-05", "--days-ago", "2"])
            .selection()
            .is_err());
        let backwards = run_args(&["--start-date", "2024-01-07", "--end-date", "2024-01-05"]);
        assert!(backwards.selection().is_err());
    }

    #[test]
    fn test_run_args_cnpjs() {
        let run = run_args(&[
            "--cnpj",
            "12.345.678/0001-90",
            "--cnpj",
            "98765432000110",
        ]);
        assert_eq!(run.cnpjs().len(), 2);
        assert_eq!(run.api_token(), "t");
        let short = ["run", "--api-token", "t", "--api-login", "l", "--cnpj", "123"];
        assert!(parse(&short).is_err());
    }

    #[test]
    fn test_bad_date_is_rejected() {
        let slashed = ["run", "--api-token", "t", "--api-login", "l", "--date", "05/01/2024"];
        assert!(parse(&slashed).is_err());
    }
}
