use std::path::PathBuf;

use anyhow::{anyhow, bail, Result};
use tracing_subscriber::EnvFilter;

use vidthreads::config::DisplayAction;
use vidthreads::reddit::CommentSort;
use vidthreads::RunOptions;

const HELP: &str = "vidthreads: Reddit discussions for a YouTube video.

Usage: vidthreads [options] <video id or url>

  --version, -V          Show version and exit
  --help,    -h          Show this help message
  --width <px>           Width of the comment container (default 640)
  --hint <url>           Link found next to the video; repeatable
  --sort <mode>          Comment sort: confidence, top, new, controversial, old, qa
  --config <path>        Read settings from this YAML file
  --channel <id>         Channel the video belongs to
  --remember <action>    Save threads|native as this channel's display action";

enum Command {
    Exit,
    Run(RunOptions),
}

fn main() {
    init_tracing();

    let command = match parse_args(std::env::args().skip(1)) {
        Ok(command) => command,
        Err(err) => {
            eprintln!("error: {err}\n\n{HELP}");
            std::process::exit(2);
        }
    };

    let Command::Run(options) = command else {
        return;
    };
    if let Err(err) = vidthreads::run(options) {
        eprintln!("error: {err:?}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("VIDTHREADS_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Command> {
    let mut options = RunOptions::default();
    let mut video = None;

    while let Some(arg) = args.next() {
        let mut value = |flag: &str| args.next().ok_or_else(|| anyhow!("{flag} needs a value"));
        match arg.as_str() {
            "--version" | "-V" => {
                println!("vidthreads {}", vidthreads::VERSION);
                return Ok(Command::Exit);
            }
            "--help" | "-h" => {
                println!("{HELP}");
                return Ok(Command::Exit);
            }
            "--width" => {
                let raw = value("--width")?;
                let width = raw
                    .parse::<i64>()
                    .map_err(|_| anyhow!("--width expects pixels, got {raw}"))?;
                options.container_width = Some(width);
            }
            "--hint" => options.hint_links.push(value("--hint")?),
            "--sort" => {
                let raw = value("--sort")?;
                let sort = CommentSort::from_key(&raw).ok_or_else(|| anyhow!("unknown sort {raw}"))?;
                options.sort = Some(sort);
            }
            "--config" => options.config_file = Some(PathBuf::from(value("--config")?)),
            "--channel" => options.channel = Some(value("--channel")?),
            "--remember" => {
                let raw = value("--remember")?;
                let action =
                    DisplayAction::from_key(&raw).ok_or_else(|| anyhow!("unknown display action {raw}"))?;
                options.remember = Some(action);
            }
            flag if flag.starts_with('-') => bail!("unknown option {flag}"),
            _ => {
                if video.replace(arg.clone()).is_some() {
                    bail!("only one video can be given");
                }
            }
        }
    }

    if options.remember.is_some() && options.channel.is_none() {
        bail!("--remember needs --channel");
    }
    options.video = video.ok_or_else(|| anyhow!("missing video id or url"))?;
    Ok(Command::Run(options))
}
