use gator::commands::{Command, Registry, State};
use gator::config::Config;
use gator::db::DB;
use gator::error::CommandError;
use std::fs;
use std::io;
use std::process;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let command = match Command::from_args(std::env::args().skip(1).collect()) {
        Some(command) => command,
        None => {
            eprintln!("not enough arguments, usage: gator <command> [args...]");
            process::exit(1);
        }
    };

    if let Err(err) = run(&command) {
        eprintln!("error running command {}: {}", command.name, err);
        process::exit(1);
    }
}

fn run(command: &Command) -> Result<(), CommandError> {
    let config_path = Config::default_path()?;
    let config = Config::from(&config_path)?;
    let db_path = config.db_path(&config_path);
    if let Some(dir) = db_path.parent() {
        fs::create_dir_all(dir)?;
    }
    let db = DB::open(&db_path)?;
    let mut state = State {
        config,
        config_path,
        db,
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();

    Registry::with_default_commands().run(&mut state, command, &mut out)
}
