use clap::{value_parser, Arg, Command, ValueHint};
use rescore_cli::input::Input;
use rescore_cli::runner::Runner;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::default()
        .filter_level(log::LevelFilter::Error)
        .parse_env(env_logger::Env::default().filter_or("RESCORE_LOG", "error,rescore=info"))
        .init();

    let matches = Command::new("rescore")
        .version(clap::crate_version!())
        .about("Rescore search engine PSMs with predicted retention time, ion mobility and fragment intensities")
        .arg(
            Arg::new("parameters")
                .required(true)
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .help(
                    "Path to configuration parameters (JSON file), or the first \
                     PSM file to rescore with default parameters",
                )
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("psm_paths")
                .num_args(1..)
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .help(
                    "Paths to PSM files to rescore. Overrides PSM files listed in the \
                     configuration file.",
                )
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("spectrum_path")
                .short('s')
                .long("spectrum_path")
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .help(
                    "Path to an MGF file, or a directory of MGF files named after \
                     each run. Overrides the path in the configuration file.",
                )
                .value_hint(ValueHint::AnyPath),
        )
        .arg(
            Arg::new("output_directory")
                .short('o')
                .long("output_directory")
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .help(
                    "Path where rescoring results will be written. \
                     Overrides the directory specified in the configuration file.",
                )
                .value_hint(ValueHint::DirPath),
        )
        .arg(
            Arg::new("psm_format")
                .long("format")
                .value_parser(["sage", "pin", "percolator", "tsv", "psm_utils"])
                .help("PSM file format. Inferred from the file header if not set")
                .value_hint(ValueHint::Other),
        )
        .arg(
            Arg::new("threads")
                .long("threads")
                .value_parser(value_parser!(u16).range(1..))
                .help("Number of threads used for feature generation (default = # of CPUs)")
                .value_hint(ValueHint::Other),
        )
        .arg(
            Arg::new("write-pin")
                .long("write-pin")
                .action(clap::ArgAction::SetTrue)
                .help("Write percolator-compatible `.pin` files of the assembled features"),
        )
        .help_template(
            "{usage-heading} {usage}\n\n\
             {about-with-newline}\n\
             Version {version}\n\n\
             {all-args}{after-help}",
        )
        .get_matches();

    let input = Input::from_arguments(matches)?;
    let runner = input.build().map(Runner::new)?;
    let runs = runner.run()?;

    let failed = runs.iter().filter(|run| run.report.passing_psms == 0).count();
    if failed > 0 {
        log::warn!("{} of {} runs had no PSMs passing the FDR threshold", failed, runs.len());
    }
    Ok(())
}
