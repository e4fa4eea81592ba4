use clap::{Arg, ArgAction, Command};
use std::process;
use std::str::FromStr;

use colored::*;
use deimos::{
    config::RunConfig,
    output::{OutputConfig, OutputFormat, OutputManager, ProgressDisplay},
    pool::BatchEngine,
    utils::file_input::FileInputHandler,
};

fn print_banner() {
    println!("{}", " ____  _____ ___ __  __  ___  ____  ".truecolor(142, 68, 173).bold());
    println!("{}", "|  _ \\| ____|_ _|  \\/  |/ _ \\/ ___| ".truecolor(142, 68, 173).bold());
    println!("{}", "| | | |  _|  | || |\\/| | | | \\___ \\ ".truecolor(142, 68, 173).bold());
    println!("{}", "| |_| | |___ | || |  | | |_| |___) |".truecolor(142, 68, 173).bold());
    println!("{}", "|____/|_____|___|_|  |_|\\___/|____/ ".truecolor(142, 68, 173).bold());
    println!();
    println!("{}", "Deimos – The God of Dread. Twin of Phobos ⚡".truecolor(255, 215, 0).bold());
    println!();
    println!("{}", "------------------------------------------------------".bright_blue());
    println!("{}", ": 🔗 `https://github.com/ibrahmsql/deimos`            :".bright_blue());
    println!("{}", ": ⚡ drives your tools | retries what falters          :".bright_blue());
    println!("{}", "------------------------------------------------------".bright_blue());
    println!();
}

fn build_cli() -> Command {
    Command::new("deimos")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Bounded-concurrency batch runner for external tools")
        .arg(
            Arg::new("input")
                .value_name("FILE")
                .help("File with one task payload per line (blank lines and # comments skipped)")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::new("exec")
                .short('x')
                .long("exec")
                .value_name("CMD")
                .help("Runner command and arguments; {payload} is replaced by the payload, or the payload is appended. Consumes the rest of the command line, place it last")
                .num_args(1..)
                .allow_hyphen_values(true),
        )
        .arg(
            Arg::new("concurrency")
                .short('c')
                .long("concurrency")
                .value_name("N")
                .help("Number of concurrent runner invocations (default: CPU count)")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("timeout")
                .short('t')
                .long("timeout")
                .value_name("SECONDS")
                .help("Per-task timeout in seconds")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("max-attempts")
                .short('r')
                .long("max-attempts")
                .value_name("N")
                .help("Maximum attempts per task, including the first")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("base-delay")
                .long("base-delay")
                .value_name("MS")
                .help("Base retry delay in milliseconds (doubles per attempt)")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("max-delay")
                .long("max-delay")
                .value_name("MS")
                .help("Retry delay cap in milliseconds")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("FILE")
                .help("TOML config file (default: ~/.deimos.toml if present)"),
        )
        .arg(
            Arg::new("format")
                .short('o')
                .long("format")
                .value_name("FORMAT")
                .help("Report format: text, json, csv"),
        )
        .arg(
            Arg::new("output-file")
                .long("output-file")
                .value_name("FILE")
                .help("Write the report to a file instead of stdout"),
        )
        .arg(
            Arg::new("unique")
                .long("unique")
                .help("Drop duplicate payloads from the input file")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("max-targets")
                .long("max-targets")
                .value_name("N")
                .help("Read at most N payloads from the input file")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("no-banner")
                .long("no-banner")
                .help("Hide the banner")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("no-progress")
                .long("no-progress")
                .help("Disable the progress bar")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("no-color")
                .long("no-color")
                .help("Disable colored output")
                .action(ArgAction::SetTrue),
        )
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let matches = build_cli().get_matches();

    let no_color = matches.get_flag("no-color");
    if no_color {
        colored::control::set_override(false);
    }

    let format = matches
        .get_one::<String>("format")
        .map(|s| match OutputFormat::from_str(s) {
            Ok(format) => format,
            Err(e) => {
                eprintln!("{} {}", "[!]".bright_red(), e);
                process::exit(2);
            }
        })
        .unwrap_or(OutputFormat::Text);

    // Reports to stdout own the terminal; keep it clean for them
    let machine_output =
        format != OutputFormat::Text && matches.get_one::<String>("output-file").is_none();

    if !matches.get_flag("no-banner") && !machine_output {
        print_banner();
    }

    // Config file first, CLI flags override
    let mut config = match matches.get_one::<String>("config") {
        Some(path) => match RunConfig::from_toml_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("{} {}", "[!]".bright_red(), e);
                process::exit(2);
            }
        },
        None => RunConfig::load_default_config(),
    };

    if let Some(command) = matches.get_many::<String>("exec") {
        config.command = command.cloned().collect();
    }
    if let Some(&concurrency) = matches.get_one::<usize>("concurrency") {
        config.concurrency = concurrency;
    }
    if let Some(&timeout) = matches.get_one::<u64>("timeout") {
        config.timeout = timeout * 1000;
    }
    if let Some(&max_attempts) = matches.get_one::<u32>("max-attempts") {
        config.max_attempts = max_attempts;
    }
    if let Some(&base_delay) = matches.get_one::<u64>("base-delay") {
        config.base_delay = base_delay;
    }
    if let Some(&max_delay) = matches.get_one::<u64>("max-delay") {
        config.max_delay = max_delay;
    }

    if let Err(e) = config.validate() {
        eprintln!("{} {}", "[!]".bright_red(), e);
        process::exit(2);
    }

    let input_file = matches.get_one::<String>("input").unwrap();
    let handler = FileInputHandler::new(
        matches
            .get_one::<usize>("max-targets")
            .copied()
            .unwrap_or(100_000),
        matches.get_flag("unique"),
    );

    let (payloads, stats) = match handler.read_payloads_from_file(input_file) {
        Ok(result) => result,
        Err(e) => {
            eprintln!("{} {:#}", "[!]".bright_red(), e);
            process::exit(2);
        }
    };

    if !machine_output {
        println!(
            "{} Loaded {} payloads from {} ({} lines, {} duplicates removed)",
            "[~]".bright_blue(),
            payloads.len().to_string().bright_cyan(),
            input_file,
            stats.total_lines,
            stats.duplicates_removed
        );
        println!(
            "{} Runner: {} | concurrency {} | timeout {}s | up to {} attempts",
            "[~]".bright_blue(),
            config.command.join(" ").bright_cyan(),
            config.concurrency,
            config.timeout / 1000,
            config.max_attempts
        );
        println!();
    }

    let engine = match BatchEngine::new(config) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("{} {}", "[!]".bright_red(), e);
            process::exit(2);
        }
    };

    // Ctrl-C cancels the run; the partial report is still written
    let cancel = engine.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n{} Interrupted, stopping the pool...", "[!]".bright_yellow());
            cancel.cancel();
        }
    });

    let show_progress = !matches.get_flag("no-progress") && !machine_output;
    let engine = if show_progress {
        let display = ProgressDisplay::new(payloads.len());
        engine.with_progress(move |completed, total| {
            display.update(completed);
            if completed == total {
                display.finish();
            }
        })
    } else {
        engine
    };

    let summary = match engine.run(&payloads).await {
        Ok(summary) => summary,
        Err(e) => {
            eprintln!("{} {}", "[!]".bright_red(), e);
            process::exit(2);
        }
    };

    let output_manager = OutputManager::new(OutputConfig {
        format,
        file: matches.get_one::<String>("output-file").cloned(),
        colored: !no_color,
    });

    if let Err(e) = output_manager.write_summary(&summary) {
        eprintln!("{} {}", "[!]".bright_red(), e);
        process::exit(2);
    }

    // Nonzero exit if any task ended in anything but success
    if summary.is_clean() {
        process::exit(0);
    } else {
        process::exit(1);
    }
}
