//! SQLPocket - run SQL against a MySQL server, optionally through SSH.
//!
//! Usage: `sqlpocket <profile.json> <sql | -> [--all]`
//!
//! The profile holds a `ServerEndpoint` and an optional `TunnelSpec`. SQL is
//! read from stdin when given as `-`. The outcome of the last statement is
//! printed as JSON; with `--all` every page of a SELECT is loaded first.

use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use sqlpocket_core::logging::{init_logging, LogConfig};
use sqlpocket_core::{ConnectionProfile, PocketError, PocketState, QueryOutcome, QueryTarget};

#[derive(Parser, Debug)]
#[command(name = "sqlpocket", version, about = "Run SQL against a MySQL server, optionally through SSH")]
struct Args {
    /// Connection profile (JSON with `endpoint` and optional `tunnel`).
    profile: PathBuf,

    /// SQL text to run, or `-` to read it from stdin.
    sql: String,

    /// Load every page of the final SELECT before printing.
    #[arg(long)]
    all: bool,
}

impl Args {
    fn sql_text(&self) -> Result<String, String> {
        if self.sql != "-" {
            return Ok(self.sql.clone());
        }
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf).map_err(|e| format!("failed to read stdin: {e}"))?;
        Ok(buf)
    }
}

async fn run(state: &PocketState, args: &Args, sql: &str) -> Result<QueryOutcome, PocketError> {
    let profile = ConnectionProfile::load(&args.profile)?;
    let sessions = state.sessions();

    sessions.connect(&profile.endpoint, profile.tunnel.as_ref()).await?;

    let target = profile.endpoint.database.clone().map(QueryTarget::database).unwrap_or_default();
    let result = async {
        let mut outcome = sessions.run_query(sql, target).await?;
        if args.all {
            while let Some(snapshot) = sessions.load_more().await? {
                outcome = QueryOutcome::Rows(snapshot);
            }
        }
        Ok::<_, PocketError>(outcome)
    }
    .await;

    sessions.disconnect().await;
    result
}

fn main() -> ExitCode {
    let args = Args::parse();
    let sql = match args.sql_text() {
        Ok(sql) => sql,
        Err(message) => {
            eprintln!("error: {message}");
            return ExitCode::from(2);
        }
    };

    let state = match PocketState::new() {
        Ok(state) => state,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut log_config = LogConfig::new(state.config().log_dir(state.data_dir()));
    if let Some(filter) = &state.config().log_filter {
        log_config = log_config.with_filter(filter.clone());
    }
    let _logging_guard = init_logging(log_config);

    tracing::info!(profile = %args.profile.display(), "Starting SQLPocket");

    match state.block_on(run(&state, &args, &sql)) {
        Ok(outcome) => match serde_json::to_string_pretty(&outcome) {
            Ok(json) => {
                println!("{json}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("error: failed to encode result: {e}");
                ExitCode::FAILURE
            }
        },
        Err(e) => {
            tracing::error!(error = %e, "Query failed");
            let info = e.to_error_info();
            match serde_json::to_string_pretty(&info) {
                Ok(json) => eprintln!("{json}"),
                Err(_) => eprintln!("error: {e}"),
            }
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_args_definition_is_valid() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_profile_sql_and_all() {
        let args = Args::try_parse_from(["sqlpocket", "prod.json", "SELECT 1", "--all"]).unwrap();
        assert_eq!(args.profile, PathBuf::from("prod.json"));
        assert_eq!(args.sql, "SELECT 1");
        assert!(args.all);
        assert_eq!(args.sql_text().unwrap(), "SELECT 1");

        let args = Args::try_parse_from(["sqlpocket", "prod.json", "SHOW TABLES"]).unwrap();
        assert!(!args.all);
    }

    #[test]
    fn test_missing_sql_is_rejected() {
        assert!(Args::try_parse_from(["sqlpocket", "prod.json"]).is_err());
    }
}
