use clap::Parser;

use aio_pipe::config::Config;
use aio_pipe::ims::ImsClient;
use aio_pipe::pipeline::{Pipeline, PipelineReport};
use aio_pipe::runner::ProcessRunner;
use aio_pipe::token::TokenProvider;

mod output;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "aio-pipe")]
#[command(version = VERSION)]
#[command(about = "Authenticate and run aio app build/deploy across one or more app directories")]
struct Cli {
    /// Run mode: build, deploy or auth (defaults to $COMMAND)
    mode: Option<String>,

    /// Print diagnostic output (same as DEBUG=true)
    #[arg(long)]
    debug: bool,

    /// Print a JSON result envelope instead of a status line
    #[arg(long)]
    json: bool,
}

fn run(cli: &Cli, label: &mut String) -> aio_pipe::Result<PipelineReport> {
    let config = Config::from_env()?
        .with_command(cli.mode.clone())
        .with_debug(cli.debug);
    aio_pipe::set_debug(config.debug);

    if let Some(command) = &config.command {
        *label = command.clone();
    }

    let runner = ProcessRunner::new(config.run_as_user.clone());
    let ims = ImsClient::new(config.ims_host.clone());
    let tokens = TokenProvider::new(&config.ims, &ims);

    Pipeline::new(&config, &runner, &tokens).run()
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    let mut label = cli.mode.clone().unwrap_or_else(|| "pipeline".to_string());
    let result = run(&cli, &mut label);

    if cli.json {
        if let Err(err) = output::print_json_result(&result) {
            eprintln!("Error: {}", err);
        }
    } else {
        output::print_status_line(&label, &result);
    }

    let exit_code = match &result {
        Ok(_) => 0,
        Err(err) => output::exit_code_for_error(err.code),
    };
    std::process::ExitCode::from(exit_code_to_u8(exit_code))
}

fn exit_code_to_u8(code: i32) -> u8 {
    if code <= 0 {
        0
    } else if code >= 255 {
        255
    } else {
        code as u8
    }
}
