use std::process::ExitCode;

fn main() -> ExitCode {
    grantwise_cli::run()
}
