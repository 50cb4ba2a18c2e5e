use std::process::ExitCode;

fn main() -> ExitCode {
    match dm_decay_scan::app::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            // Usage errors were already printed by clap.
            let message = err.to_string();
            if !message.is_empty() {
                eprintln!("{message}");
            }
            ExitCode::from(err.exit_code())
        }
    }
}
