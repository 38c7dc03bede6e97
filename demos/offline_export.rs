use std::env;
use std::error::Error;
use std::fs;

use logix_tags::TagDescriptor;
use paxtags::{export, ExportOptions, ExportOutcome, StaticTagSource};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

type Result<T> = std::result::Result<T, Box<dyn Error>>;

const SNAPSHOT: &str = r#"[
    { "name": "Tank1", "declared_type": "P_AIn", "dimensions": [0, 0, 0] },
    { "name": "Tank2", "declared_type": "P_AIn", "dimensions": [2, 0, 0] },
    { "name": "Grid", "declared_type": "P_AIn", "dimensions": [2, 2, 0] },
    { "name": "TankAlias", "declared_type": "P_AIn", "is_alias": true },
    { "name": "Valve1", "declared_type": "P_ValveSO" },
    { "name": "Program:Main.Level", "declared_type": "P_AIn" }
]"#;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    if args.iter().any(|arg| arg == "--help") {
        eprintln!("Usage: offline_export [TYPE] [SNAPSHOT.json]");
        eprintln!("  TYPE           AOI/UDT type to export (default P_AIn)");
        eprintln!("  SNAPSHOT.json  array of tag descriptors (default: built-in sample)");
        return Ok(());
    }
    let type_name = args.first().map(String::as_str).unwrap_or("P_AIn");
    let json = match args.get(1) {
        Some(path) => fs::read_to_string(path)?,
        None => SNAPSHOT.to_string(),
    };

    let tags: Vec<TagDescriptor> = serde_json::from_str(&json)?;
    info!(tags = tags.len(), "loaded snapshot");
    let mut source = StaticTagSource::new("OfflineDemo", tags);
    match export(&mut source, type_name, &ExportOptions::default()).await? {
        ExportOutcome::Generated(generated) => {
            for err in &generated.rejected {
                warn!(%err, "descriptor skipped");
            }
            info!(
                instances = generated.instance_count,
                type_name = %generated.type_name,
                file = %generated.file_name(),
                "document ready"
            );
            println!("{}", generated.to_xml()?);
        }
        ExportOutcome::NoInstances { rejected, .. } => {
            for err in &rejected {
                warn!(%err, "descriptor skipped");
            }
            info!(type_name, "no instances in snapshot");
        }
    }
    Ok(())
}
