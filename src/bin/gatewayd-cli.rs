//! `gatewayd-cli` — operator-facing helper commands that don't need a
//! running daemon: schema validation and IQRF Code inspection.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use gatewayd_core::iqrf_code;
use gatewayd_core::schema::SchemaRegistry;

/// Command-line interface for `gatewayd-core`.
#[derive(Parser)]
#[command(name = "gatewayd-cli", version = env!("CARGO_PKG_VERSION"))]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Loads every schema file in a directory and reports errors.
    ValidateSchemas {
        /// Directory to scan for `<tag>-<direction>-<major>-<minor>-<micro>.json` files.
        dir: PathBuf,
    },
    /// Decodes a Smart Connect IQRF Code and prints its fields.
    DecodeCode {
        /// The printed base-57 code, including its trailing check character.
        code: String,
    },
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    match args.command {
        Command::ValidateSchemas { dir } => {
            let _registry = SchemaRegistry::load_dir(&dir)?;
            println!("schemas in {} loaded without error", dir.display());
        }
        Command::DecodeCode { code } => {
            let decoded = iqrf_code::decode(&code)?;
            if let Some(mid) = decoded.mid {
                println!("mid: {}", hex(&mid));
            }
            if let Some(ibk) = decoded.ibk {
                println!("ibk: {}", hex(&ibk));
            }
            if let Some(hwpid) = decoded.hwpid {
                println!("hwpid: {hwpid:04X}");
            }
        }
    }

    Ok(())
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02X}")).collect::<Vec<_>>().join("")
}
