use dialoguer::{Input, Select};
use std::fs;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use crate::config::generate::generate_starter_config;
use crate::config::{load_config, user_config_path};

const SYSTEM_CONFIG: &str = "/etc/recpub/config.yml";

/// Writes the starter config to the user config location (or stdout).
pub fn init(stdout: bool) -> Result<(), Box<dyn std::error::Error>> {
    let content = generate_starter_config();

    if stdout {
        print!("{}", content);
        return Ok(());
    }

    let path = user_config_path().unwrap_or_else(|| PathBuf::from(SYSTEM_CONFIG));

    if path.exists() && !std::io::stdin().is_terminal() {
        return Err(format!(
            "config file already exists at {}; remove it first or use --stdout",
            path.display()
        )
        .into());
    }

    write_config(&content, path)
}

/// Writes `content` to `path`, asking for another path (or stdout) when the
/// file exists or cannot be written.
fn write_config(content: &str, mut path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    loop {
        if path.exists() {
            eprintln!("File already exists at {}", path.display());
            match choose(&["Overwrite", "Choose a different path", "Print to stdout instead"])? {
                0 => {}
                2 => {
                    print!("{}", content);
                    return Ok(());
                }
                _ => {
                    path = ask_path(&path)?;
                    continue;
                }
            }
        }

        let written = path
            .parent()
            .map_or(Ok(()), fs::create_dir_all)
            .and_then(|_| fs::write(&path, content));

        match written {
            Ok(()) => {
                println!("Config file written to {}", path.display());
                return Ok(());
            }
            Err(e) => {
                eprintln!("Cannot write to {}: {}", path.display(), e);
                if !std::io::stdin().is_terminal() {
                    return Err(e.into());
                }
                if choose(&["Choose a different path", "Print to stdout instead"])? == 1 {
                    print!("{}", content);
                    return Ok(());
                }
                path = ask_path(&path)?;
            }
        }
    }
}

fn choose(options: &[&str]) -> Result<usize, dialoguer::Error> {
    Select::new()
        .with_prompt("What would you like to do?")
        .items(options)
        .default(0)
        .interact()
}

fn ask_path(current: &Path) -> Result<PathBuf, dialoguer::Error> {
    let path: String = Input::new()
        .with_prompt("Config file path")
        .default(current.display().to_string())
        .interact_text()?;
    Ok(PathBuf::from(path))
}

pub fn validate(config_path: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let path = config_path.ok_or("No config file found. Use --config to specify a path.")?;

    println!("Validating config file: {}", path.display());

    match load_config(&path) {
        Ok(_) => {
            println!("✓ Config is valid");
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Config validation failed:\n{}", e);
            std::process::exit(1);
        }
    }
}
