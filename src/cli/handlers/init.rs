use std::path::{Path, PathBuf};

use crate::cli::commands::InitArgs;
use crate::io::config_io::{self, DATA_DIR_NAME};
use crate::model::config::StoreConfig;

/// Build the config written by `nb init` from its flags.
fn config_from_args(args: &InitArgs) -> StoreConfig {
    let mut config = StoreConfig::default();
    config.notes.default_image = args.default_image;
    config
}

/// The store another `nb` invocation from `cwd` would already pick up, if any.
fn enclosing_store(cwd: &Path) -> Option<PathBuf> {
    config_io::discover_data_dir(cwd.parent()?).ok()
}

pub fn cmd_init(args: InitArgs, data_dir: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let config = config_from_args(&args);

    let created = match data_dir {
        Some(dir) => {
            let dir = PathBuf::from(dir);
            config_io::init_at(&dir, &config, args.force)?;
            dir
        }
        None => {
            let cwd = std::env::current_dir()?;
            if let Some(parent) = enclosing_store(&cwd) {
                eprintln!("Note: enclosing store found at {}/", parent.display());
                eprintln!("Creating new store in ./{}/", DATA_DIR_NAME);
            }
            config_io::init_data_dir(&cwd, &config, args.force)?
        }
    };

    log::debug!("initialized store at {}", created.display());
    println!("Initialized notebox store in {}", created.display());
    if let Some(image) = config.notes.default_image {
        println!("  default image: bundled:{}", image);
    }
    Ok(())
}
