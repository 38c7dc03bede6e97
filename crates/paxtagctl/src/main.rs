use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use paxtags::ExportOptions;
use tracing_subscriber::EnvFilter;

mod cmd_export;

use cmd_export::Finished;

/// AOI type exported when none is given.
const DEFAULT_AOI: &str = "P_AIn";

#[derive(Parser, Debug)]
#[command(
    name = "paxtagctl",
    about = "PlantPAx Ignition tag generator",
    after_help = "Writes <PLC>_<AOI>_IgnitionTags.xml to the current directory."
)]
struct Cli {
    /// Path to PLC (host[:port][/slot])
    commpath: String,
    /// AOI to create tags for
    #[arg(value_name = "AOI", default_value = DEFAULT_AOI)]
    aoi: String,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let Cli { commpath, aoi } = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with_target(false)
        .init();

    let options = ExportOptions::default();
    let code = match cmd_export::run(&commpath, &aoi, &options).await? {
        Finished::Written(_) | Finished::NoInstances => ExitCode::SUCCESS,
        Finished::Unreachable => ExitCode::FAILURE,
    };
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aoi_defaults_to_p_ain() {
        let cli = Cli::parse_from(["paxtagctl", "192.168.1.10"]);
        assert_eq!(cli.commpath, "192.168.1.10");
        assert_eq!(cli.aoi, "P_AIn");
    }

    #[test]
    fn explicit_aoi() {
        let cli = Cli::parse_from(["paxtagctl", "10.0.0.5/2", "P_ValveSO"]);
        assert_eq!(cli.commpath, "10.0.0.5/2");
        assert_eq!(cli.aoi, "P_ValveSO");
    }

    #[test]
    fn commpath_is_required() {
        assert!(Cli::try_parse_from(["paxtagctl"]).is_err());
    }

    #[test]
    fn no_extra_arguments() {
        assert!(Cli::try_parse_from(["paxtagctl", "plc", "P_AIn", "extra"]).is_err());
    }
}
