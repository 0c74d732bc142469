use std::process::ExitCode;

fn main() -> ExitCode {
    match pull_detached::cli::run() {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}
