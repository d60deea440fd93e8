use std::path::PathBuf;

use suggestion_bridge::config::DEFAULT_SERVER_EXECUTABLE;
use suggestion_bridge::provider::{DirectoryInstallation, InstallationCheck, InstallationState};

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let Some(first) = args.next() else {
        print_usage();
        return Ok(());
    };

    match first.as_str() {
        "check" => run_check(args),
        "-V" | "--version" => {
            print_version();
            Ok(())
        }
        "-h" | "--help" => {
            print_usage();
            Ok(())
        }
        other => Err(anyhow::anyhow!("unknown subcommand {other}")),
    }
}

fn run_check<I>(mut args: I) -> anyhow::Result<()>
where
    I: Iterator<Item = String>,
{
    let mut support_dir = PathBuf::from(".");
    let mut executable = DEFAULT_SERVER_EXECUTABLE.to_string();
    let mut min_version = "1.0.0".to_string();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--support-dir" => {
                support_dir = args
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--support-dir requires PATH"))?
                    .into();
            }
            "--executable" => {
                executable = args
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--executable requires NAME"))?;
            }
            "--min-version" => {
                min_version = args
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--min-version requires VERSION"))?;
            }
            "-h" | "--help" => {
                print_check_usage();
                return Ok(());
            }
            other => return Err(anyhow::anyhow!("unknown check flag {other}")),
        }
    }

    let check = DirectoryInstallation::new(support_dir.join("bin"), executable, min_version);
    match check.query() {
        InstallationState::Installed { version } => println!("installed {version}"),
        InstallationState::Outdated {
            version,
            min_required,
        } => println!("outdated {version} (requires {min_required})"),
        InstallationState::NotInstalled => println!("not installed"),
    }
    Ok(())
}

fn print_usage() {
    eprintln!(
        "Usage:\n  suggestion-bridge check [--support-dir PATH] [--executable NAME] [--min-version VERSION]\n  suggestion-bridge --version\n"
    );
}

fn print_check_usage() {
    eprintln!(
        "Usage:\n  suggestion-bridge check [--support-dir PATH] [--executable NAME] [--min-version VERSION]\n"
    );
}

fn print_version() {
    println!("suggestion-bridge {}", env!("CARGO_PKG_VERSION"));
}
