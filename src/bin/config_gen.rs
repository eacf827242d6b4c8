//! Generates an example YAML config for every registered input and output
//! type.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

#[derive(Parser)]
#[command(
    name = "config_gen",
    about = "Writes a sanitised example config per registered input/output type"
)]
struct Args {
    /// The directory to write config examples to.
    #[arg(long, default_value = "./config")]
    dir: PathBuf,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let written = sluice::config::write_examples(&args.dir)
        .with_context(|| format!("writing config examples to {}", args.dir.display()))?;

    for path in written {
        println!("Generated config at: {}", path.display());
    }
    Ok(())
}
