use anyhow::Result;
use clap::Args;
use std::path::PathBuf;

use super::{Command, Context};

#[derive(Args)]
pub struct ConfigCommand {
    #[arg(long, value_name = "PATH", help = "Write the loaded settings to a TOML file instead of printing")]
    pub save: Option<PathBuf>,
}

impl Command for ConfigCommand {
    async fn execute(&self, ctx: &Context) -> Result<()> {
        if let Some(path) = &self.save {
            ctx.config.save_to_file(path)?;
            println!("💾 Configuration written to {}", path.display());
            return Ok(());
        }

        let mut effective = ctx.config.clone();
        effective.store.root = Some(ctx.coordinator.store().root().to_path_buf());
        print!("{}", effective.to_toml()?);
        Ok(())
    }
}
