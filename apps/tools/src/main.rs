use std::{fs, path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use command_channel::{ChannelConfig, SharedChannel};
use serde_json::Value;
use server_api::{dispatch, ApiContext, LoadProgramRequest};
use shared::{
    domain::{Program, ProgramId},
    error::{ApiError, ApiException},
};
use storage::Storage;
use tracing_subscriber::EnvFilter;

/// Operator tool for the program store and a running brewd.
#[derive(Parser, Debug)]
#[command(name = "aegirctl")]
struct Cli {
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://./data/aegir.db")]
    database_url: String,
    #[arg(long, env = "BREWD_ADDR", default_value = "127.0.0.1:42069")]
    brewd_addr: String,
    #[arg(long, default_value_t = 1000)]
    timeout_ms: u64,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    ListPrograms,
    ShowProgram {
        id: i64,
    },
    /// Stores a program read from a JSON file.
    ImportProgram {
        file: PathBuf,
    },
    DeleteProgram {
        id: i64,
    },
    /// Loads a stored program into brewd, now or at `--at`.
    Load {
        id: i64,
        #[arg(long)]
        volume: i64,
        #[arg(long)]
        at: Option<String>,
    },
    State {
        #[arg(long)]
        history: bool,
    },
    /// Advances the brew process: hasMalt, spargeDone, startBoil,
    /// coolingDone, transferDone or reset.
    Command {
        token: String,
    },
    Maintenance {
        mode: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let storage = Storage::new(&cli.database_url)
        .await
        .with_context(|| format!("cannot open {}", cli.database_url))?;
    let brewd = SharedChannel::tcp(&ChannelConfig {
        timeout: Duration::from_millis(cli.timeout_ms),
        ..ChannelConfig::new(cli.brewd_addr.clone())
    });
    let ctx = ApiContext { storage, brewd };

    match cli.command {
        Command::ListPrograms => {
            for summary in checked(server_api::list_programs(&ctx).await)? {
                println!("{}\t{}", summary.id.0, summary.name);
            }
        }
        Command::ShowProgram { id } => {
            let program = checked(server_api::get_program(&ctx, ProgramId(id)).await)?;
            println!("{}", serde_json::to_string_pretty(&program)?);
        }
        Command::ImportProgram { file } => {
            let raw = fs::read_to_string(&file)
                .with_context(|| format!("cannot read {}", file.display()))?;
            let program: Program = serde_json::from_str(&raw)
                .with_context(|| format!("{} is not a program", file.display()))?;
            let id = checked(server_api::create_program(&ctx, program).await)?;
            println!("created program_id={}", id.0);
        }
        Command::DeleteProgram { id } => {
            checked(server_api::delete_program(&ctx, ProgramId(id)).await)?;
            println!("deleted program_id={id}");
        }
        Command::Load { id, volume, at } => {
            let request = LoadProgramRequest {
                id: ProgramId(id),
                startmode: if at.is_some() { "timed" } else { "now" }.to_string(),
                startat: at,
                volume,
            };
            print_data(checked(dispatch::load_program(&ctx, &request, Utc::now()).await)?)?;
        }
        Command::State { history } => {
            print_data(checked(dispatch::get_state(&ctx, history).await)?)?;
        }
        Command::Command { token } => {
            print_data(checked(dispatch::send_state_command(&ctx, &token).await)?)?;
        }
        Command::Maintenance { mode } => {
            print_data(checked(dispatch::set_maintenance_mode(&ctx, &mode).await)?)?;
        }
    }

    Ok(())
}

fn checked<T>(result: Result<T, ApiError>) -> Result<T, ApiException> {
    result.map_err(ApiException::from)
}

fn print_data(data: Value) -> Result<()> {
    if !data.is_null() {
        println!("{}", serde_json::to_string_pretty(&data)?);
    }
    Ok(())
}
