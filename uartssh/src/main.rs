//! uartssh: serve a UART over SSH, one client at a time.
//!
//! # Usage
//!
//! ```bash
//! uartssh --port 2222 --host-key ./hostkey_rsa --uart /dev/ttyUSB0 --baud 115200
//! ```
//!
//! Any failed session ends the process with status 1 so that the service
//! manager restarts it.

use std::env;
use std::net::IpAddr;
use std::path::PathBuf;

use log::{error, info};
use uartssh::BridgeBuilder;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // RUST_LOG overrides the default filter
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let mut builder = BridgeBuilder::new()
        .log_credentials(args.log_credentials)
        .baud_rate(args.baud);
    if let Some(addr) = args.listen {
        builder = builder.listen_addr(addr);
    }
    if let Some(port) = args.port {
        builder = builder.port(port);
    }
    if let Some(path) = args.host_key {
        builder = builder.host_key(path);
    }
    if let Some(path) = args.uart {
        builder = builder.uart_path(path);
    }
    match (args.user, args.password) {
        (Some(user), Some(password)) => builder = builder.credential(user, password),
        (None, None) => {}
        _ => {
            eprintln!("Error: --user and --password must be given together");
            std::process::exit(1);
        }
    }
    if args.no_banner {
        builder = builder.banner(None);
    }

    let mut supervisor = match builder.build().await {
        Ok(supervisor) => supervisor,
        Err(e) => {
            error!("{}", e);
            error!("Aborting now.");
            std::process::exit(1);
        }
    };

    loop {
        let status = supervisor.run_once().await;
        let code = status.code();
        info!("execution result: {}", code);
        if code != 0 {
            error!("Rebooting due to execution error");
            std::process::exit(code);
        }
    }
}

/// Simple argument parser
struct Args {
    listen: Option<IpAddr>,
    port: Option<u16>,
    host_key: Option<PathBuf>,
    uart: Option<PathBuf>,
    baud: u32,
    user: Option<String>,
    password: Option<String>,
    no_banner: bool,
    log_credentials: bool,
}

impl Args {
    fn parse() -> Self {
        let args: Vec<String> = env::args().collect();
        let mut parsed = Self {
            listen: None,
            port: None,
            host_key: None,
            uart: None,
            baud: uartssh::uart::DEFAULT_BAUD_RATE,
            user: None,
            password: None,
            no_banner: false,
            log_credentials: false,
        };

        let mut i = 1;
        while i < args.len() {
            let flag = args[i].as_str();
            match flag {
                "--no-banner" => parsed.no_banner = true,
                "--log-credentials" => parsed.log_credentials = true,
                "--help" | "-h" => {
                    Self::print_help();
                    std::process::exit(0);
                }
                "--listen" | "-l" | "--port" | "-p" | "--host-key" | "-k" | "--uart" | "-d"
                | "--baud" | "-b" | "--user" | "-u" | "--password" | "-P" => {
                    i += 1;
                    let Some(value) = args.get(i) else {
                        eprintln!("Missing value for {}", flag);
                        std::process::exit(1);
                    };
                    parsed.set(flag, value);
                }
                _ => {
                    eprintln!("Unknown argument: {}", flag);
                }
            }
            i += 1;
        }

        parsed
    }

    fn set(&mut self, flag: &str, value: &str) {
        match flag {
            "--listen" | "-l" => self.listen = Some(parse_or_exit(flag, value)),
            "--port" | "-p" => self.port = Some(parse_or_exit(flag, value)),
            "--host-key" | "-k" => self.host_key = Some(PathBuf::from(value)),
            "--uart" | "-d" => self.uart = Some(PathBuf::from(value)),
            "--baud" | "-b" => self.baud = parse_or_exit(flag, value),
            "--user" | "-u" => self.user = Some(value.to_string()),
            "--password" | "-P" => self.password = Some(value.to_string()),
            _ => {}
        }
    }

    fn print_help() {
        println!(
            r#"uartssh: SSH access to a serial console

USAGE:
    uartssh [OPTIONS]

OPTIONS:
    -l, --listen <ADDR>      Address to bind [default: 0.0.0.0]
    -p, --port <PORT>        SSH port [default: 22]
    -k, --host-key <PATH>    Host private key [default: /spiffs/hostkey_rsa]
    -d, --uart <PATH>        Serial device [default: /dev/ttyS1]
    -b, --baud <RATE>        Baud rate [default: 115200]
    -u, --user <USER>        Login user (with --password)
    -P, --password <PASS>    Login password (with --user)
    --no-banner              Do not greet the client on connect
    --log-credentials        Log presented passwords (diagnostics only)
    -h, --help               Print this help message

Send Ctrl-G on its own to drop the connection.
Set RUST_LOG=debug for verbose output."#
        );
    }
}

fn parse_or_exit<T: std::str::FromStr>(flag: &str, value: &str) -> T {
    value.parse().unwrap_or_else(|_| {
        eprintln!("Invalid value for {}: {}", flag, value);
        std::process::exit(1);
    })
}
