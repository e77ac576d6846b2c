use std::io;
use std::process::ExitCode;
use std::time::Duration;

use console::{parse_args, run, DisplayFrames};

fn main() -> ExitCode {
    env_logger::init();

    let opts = match parse_args(std::env::args().skip(1)) {
        Ok(opts) => opts,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::from(2);
        }
    };

    let stdin = io::stdin();
    let mut scheduler = DisplayFrames::new(Duration::from_millis(16));
    match run(&opts, stdin.lock(), io::stdout(), &mut scheduler) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}
