use clap::{value_parser, Arg, Command};
use jarpatch::patch::{self, PatchSpec};
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    env_logger::init();

    let matches = Command::new("jarpatch")
        .version("0.1.0")
        .about("Remove the fingerprinted startup guard from the UnityPlayer constructor in a jar")
        .arg(
            Arg::new("input")
                .long("input")
                .short('i')
                .value_name("JAR")
                .value_parser(value_parser!(PathBuf))
                .required(true)
                .help("Source archive containing the target class"),
        )
        .arg(
            Arg::new("output")
                .long("output")
                .short('o')
                .value_name("JAR")
                .value_parser(value_parser!(PathBuf))
                .required(true)
                .help("Destination archive (every entry except the patched class is copied through unchanged)"),
        )
        .get_matches();

    let input = matches.get_one::<PathBuf>("input").expect("required");
    let output = matches.get_one::<PathBuf>("output").expect("required");

    match patch::apply(&PatchSpec::unity_player(), input, output) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{}", err);
            ExitCode::FAILURE
        }
    }
}
