use std::{
    fs::File,
    io::{self, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use perturb_core::{harness::parse_perturbation, init_tracing, init_tracing_with, Perturbation};
use perturb_cli::commands;
use tracing::info;

fn file_arg() -> Arg {
    Arg::new("file")
        .value_name("FILE")
        .help("Input file; stdin when omitted or '-'")
        .value_parser(value_parser!(PathBuf))
        .index(1)
}

fn perturbation_arg(default: Option<&'static str>) -> Arg {
    let arg = Arg::new("perturbation")
        .long("perturbation")
        .short('p')
        .value_name("NAME")
        .help("Perturbation to apply ('one_based_indexing' or 'none')");
    match default {
        Some(name) => arg.default_value(name),
        None => arg,
    }
}

fn cli() -> Command {
    Command::new("perturb-cli")
        .version(perturb_core::VERSION)
        .about("Perturb Python benchmark programs and assemble evaluation harnesses")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("PATH")
                .help("JSON configuration file")
                .value_parser(value_parser!(PathBuf))
                .global(true),
        )
        .arg(
            Arg::new("debug")
                .long("debug")
                .help("Enable debug logging")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("recursion-limit")
                .long("recursion-limit")
                .value_name("N")
                .help("Maximum call depth of executed programs")
                .value_parser(value_parser!(usize))
                .global(true),
        )
        .arg(
            Arg::new("no-verify")
                .long("no-verify")
                .help("Skip the assert cross-check when assembling")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .subcommand(
            Command::new("strip")
                .about("Remove type hints and typing imports")
                .arg(file_arg()),
        )
        .subcommand(
            Command::new("rewrite")
                .about("Print the perturbed program")
                .arg(file_arg())
                .arg(perturbation_arg(Some("one_based_indexing"))),
        )
        .subcommand(
            Command::new("eval")
                .about("Run a program and print its output lines")
                .arg(file_arg())
                .arg(perturbation_arg(None)),
        )
        .subcommand(
            Command::new("assemble")
                .about("Assemble harness programs from JSON-lines benchmark records")
                .arg(file_arg())
                .arg(perturbation_arg(None))
                .arg(
                    Arg::new("fn-name")
                        .long("fn-name")
                        .value_name("NAME")
                        .help("Rename the entry point in assembled programs"),
                )
                .arg(
                    Arg::new("output")
                        .long("output")
                        .short('o')
                        .value_name("PATH")
                        .help("Write JSON lines here instead of stdout")
                        .value_parser(value_parser!(PathBuf)),
                ),
        )
        .subcommand(Command::new("self-check").about("Run the one-based indexing self-checks"))
}

fn perturbation(matches: &ArgMatches) -> Result<Option<Perturbation>> {
    let name = matches.get_one::<String>("perturbation").map(String::as_str);
    Ok(parse_perturbation(name)?)
}

fn main() -> Result<()> {
    let matches = cli().get_matches();

    if matches.get_flag("debug") {
        init_tracing_with("perturb_core=debug,perturb_cli=debug");
    } else {
        init_tracing();
    }

    let config_path = matches.get_one::<PathBuf>("config").map(PathBuf::as_path);
    let mut config = commands::load_config(config_path)?;
    if let Some(limit) = matches.get_one::<usize>("recursion-limit") {
        config.recursion_limit = *limit;
    }
    if matches.get_flag("no-verify") {
        config.verify_with_asserts = false;
    }

    let Some((name, sub)) = matches.subcommand() else {
        return Ok(());
    };
    let input = sub.get_one::<PathBuf>("file").map(PathBuf::as_path);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    match name {
        "strip" => {
            let source = commands::read_input(input)?;
            writeln!(out, "{}", commands::strip(&source)?)?;
        }
        "rewrite" => {
            let source = commands::read_input(input)?;
            let Some(perturbation) = perturbation(sub)? else {
                writeln!(out, "{source}")?;
                return Ok(());
            };
            writeln!(out, "{}", commands::rewrite(&source, perturbation, &config)?)?;
        }
        "eval" => {
            let source = commands::read_input(input)?;
            for line in commands::eval(&source, perturbation(sub)?, &config)? {
                writeln!(out, "{line}")?;
            }
        }
        "assemble" => {
            let perturbation = perturbation(sub)?;
            let fn_name = sub.get_one::<String>("fn-name").map(String::as_str);
            let reader: Box<dyn io::BufRead> = match input {
                Some(path) if path != Path::new("-") => Box::new(BufReader::new(
                    File::open(path)
                        .with_context(|| format!("Failed to open {}", path.display()))?,
                )),
                _ => Box::new(io::stdin().lock()),
            };
            let summary = match sub.get_one::<PathBuf>("output") {
                Some(path) => {
                    let file = File::create(path)
                        .with_context(|| format!("Failed to create {}", path.display()))?;
                    let mut writer = BufWriter::new(file);
                    let summary = commands::assemble_records(
                        reader,
                        &mut writer,
                        perturbation,
                        fn_name,
                        &config,
                    )?;
                    writer.flush()?;
                    summary
                }
                None => commands::assemble_records(reader, &mut out, perturbation, fn_name, &config)?,
            };
            info!(
                records = summary.records,
                failed = summary.failed,
                "wrote assembled programs"
            );
        }
        "self-check" => {
            for line in commands::self_check(&config)? {
                writeln!(out, "{line}")?;
            }
            info!("self-check passed");
        }
        other => anyhow::bail!("Unknown command: {other}"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition() {
        cli().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let matches = cli()
            .try_get_matches_from(["perturb-cli", "eval", "prog.py", "--recursion-limit", "50"])
            .unwrap();
        assert_eq!(matches.get_one::<usize>("recursion-limit"), Some(&50));
        let (name, sub) = matches.subcommand().unwrap();
        assert_eq!(name, "eval");
        assert_eq!(perturbation(sub).unwrap(), None);
    }

    #[test]
    fn test_rewrite_defaults_to_one_based() {
        let matches = cli().try_get_matches_from(["perturb-cli", "rewrite"]).unwrap();
        let (_, sub) = matches.subcommand().unwrap();
        assert_eq!(
            perturbation(sub).unwrap(),
            Some(Perturbation::OneBasedIndexing)
        );
    }
}
