#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tinyrelay::config::Config;
use tinyrelay::server;
use tinyrelay::server::bootstrap::StartupError;

// sysexits.h-style exit codes (spec.md §6). Not all of these are exposed by
// the `libc` crate on every target, so the handful we need are spelled out
// directly rather than depending on a BSD-only header binding.
const EX_USAGE: u8 = 64;
const EX_NOUSER: u8 = 67;
const EX_SOFTWARE: u8 = 70;
const EX_OSERR: u8 = 71;
const EX_NOPERM: u8 = 77;

const LICENSE: &str = "\
tinyrelay is free software: you can redistribute it and/or modify it under
the terms of the GNU General Public License as published by the Free
Software Foundation, either version 2 of the License, or (at your option)
any later version. It comes with ABSOLUTELY NO WARRANTY.
";

#[derive(Parser)]
#[command(
    name = "tinyrelay",
    about = "A lightweight forward HTTP/HTTPS proxy",
    disable_version_flag = true,
    disable_help_flag = false
)]
struct Cli {
    /// Alternate configuration file path
    #[arg(short = 'c', long = "config", default_value = "tinyrelay.toml")]
    config: PathBuf,

    /// Do not daemonize; run in the foreground
    #[arg(short = 'd', long = "foreground")]
    foreground: bool,

    /// Print license information and exit
    #[arg(short = 'l', long = "license")]
    license: bool,

    /// Print version information and exit
    #[arg(short = 'v', long = "version")]
    version: bool,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = match e.kind() {
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => 0,
                _ => EX_USAGE,
            };
            let _ = e.print();
            return ExitCode::from(code);
        }
    };

    if cli.license {
        print!("{LICENSE}");
        return ExitCode::SUCCESS;
    }
    if cli.version {
        println!("tinyrelay {}", env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }

    // Config.daemonize lets an operator bake "always foreground" into the
    // config file; `-d` on the command line always wins over it.
    let want_daemon = !cli.foreground
        && Config::load(&cli.config)
            .map(|c| c.daemonize)
            .unwrap_or(true);

    if want_daemon {
        if let Err(e) = server::bootstrap::daemonize() {
            eprintln!("tinyrelay: failed to daemonize: {e}");
            return ExitCode::from(EX_OSERR);
        }
    }

    let worker_threads = server::runtime::get_container_cpu_limit();
    let rt = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("tinyrelay: failed to start tokio runtime: {e}");
            return ExitCode::from(EX_OSERR);
        }
    };

    let result = rt.block_on(server::bootstrap::run(server::bootstrap::BootstrapArgs {
        config_path: cli.config,
    }));

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("tinyrelay: {e}");
            let code = match e {
                StartupError::Config(_) => EX_SOFTWARE,
                StartupError::Socket(_) => EX_OSERR,
                StartupError::UnknownUser(_) => EX_NOUSER,
                StartupError::PrivilegeDrop(_) => EX_NOPERM,
            };
            ExitCode::from(code)
        }
    }
}
