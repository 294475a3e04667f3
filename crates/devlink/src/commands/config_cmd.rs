//! `devlink config`: inspect the config file and pick the default profile.

use super::{config_file, profile_not_found};
use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::error::CliError;

pub fn handle(args: &ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let path = config_file(global);
    match &args.command {
        ConfigCommand::Path => {
            println!("{}", path.display());
        }
        ConfigCommand::Profiles => {
            let cfg = devlink_config::load_config_from(&path)?;
            let mut names: Vec<&String> = cfg.profiles.keys().collect();
            names.sort();
            if names.is_empty() {
                eprintln!("no profiles configured in {}", path.display());
            }
            for name in names {
                let marker = if cfg.default_profile.as_deref() == Some(name.as_str()) {
                    "*"
                } else {
                    " "
                };
                println!("{marker} {name}");
            }
        }
        ConfigCommand::Use { name } => {
            let mut cfg = devlink_config::load_config_from(&path)?;
            if !cfg.profiles.contains_key(name) {
                return Err(profile_not_found(name.clone(), &cfg, &path));
            }
            cfg.default_profile = Some(name.clone());
            devlink_config::save_config_to(&cfg, &path)?;
            eprintln!("default profile set to '{name}'");
        }
    }
    Ok(())
}
