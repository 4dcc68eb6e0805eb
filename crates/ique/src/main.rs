// SPDX-FileCopyrightText: Copyright © 2026 ique Developers
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Interactive REPL front-end: maps single-letter commands to [`Session`]
//! calls and formats their results. No protocol or FS logic lives here.

mod cli;
#[cfg(feature = "usb-log")]
mod logging;
mod session;
mod time;

use std::io::{self, BufRead, Write};
use std::num::ParseIntError;
use std::path::Path;

use clap::Parser;
use log::error;

use cli::Cli;
use session::{Session, WriteRange};

const HELP_TEXT: &str = "\
B            connect and initialize
Q            disconnect
I            print the console's BBID
H <value>    set LED state
S <file>     sign a 20-byte SHA1 hash from <file>
J            set the console clock to the host's current UTC time
L            list files on the console
F            dump the current FS superblock to current_fs.bin
1            dump the entire NAND to nand.bin/spare.bin
X <blk>      dump one block to block_XXXX/spare_XXXX
3 <file>     read a console file to a like-named host file
C            print free/used/bad block counts and the sequence number
K <file>     list a file's block chain
h            this text
?            connection and build info
q            quit";

#[cfg(feature = "write")]
const WRITE_HELP_TEXT: &str = "\
W            write nand.bin/spare.bin to the entire NAND (includes SKSA, unsafe)
2            write nand.bin/spare.bin, skipping the SKSA
Y <blk>      write block_XXXX/spare_XXXX to one block
4 <file>     write a host file to the console
R <file>     delete a console file";

fn main() {
    let cli = Cli::parse();
    env_logger::Builder::new().filter_level(cli.log_level()).init();

    let mut session = Session::new();
    let result = match cli.script.clone() {
        Some(path) => run_script(&mut session, &cli, &path),
        None => run_interactive(&mut session, &cli),
    };

    if let Err(e) = result {
        error!("fatal: {e}");
        std::process::exit(1);
    }
}

fn run_interactive(session: &mut Session, cli: &Cli) -> io::Result<()> {
    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        if !dispatch(session, cli, line.trim_end()) {
            break;
        }
    }
    Ok(())
}

fn run_script(session: &mut Session, cli: &Cli, path: &Path) -> io::Result<()> {
    let file = std::fs::File::open(path)?;
    for line in io::BufReader::new(file).lines() {
        let line = line?;
        println!("> {line}");
        if !dispatch(session, cli, &line) {
            break;
        }
    }
    Ok(())
}

fn parse_u32(arg: &str) -> Result<u32, ParseIntError> {
    let arg = arg.trim();
    match arg.strip_prefix("0x").or_else(|| arg.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => arg.parse::<u32>().or_else(|_| u32::from_str_radix(arg, 16)),
    }
}

/// Execute one REPL line. Returns `false` if the session should end.
fn dispatch(session: &mut Session, cli: &Cli, line: &str) -> bool {
    let line = line.trim();
    if line.is_empty() {
        return true;
    }
    let mut parts = line.splitn(2, ' ');
    let verb = parts.next().unwrap_or_default();
    let rest = parts.next().unwrap_or("").trim();

    match verb {
        "B" => {
            #[cfg(feature = "usb-log")]
            let log_path = cli.usb_log.as_deref();
            #[cfg(not(feature = "usb-log"))]
            let log_path = {
                let _ = cli;
                None
            };
            report("B", session.init(log_path));
        }
        "Q" => {
            session.close();
            println!("Q: disconnected");
            return false;
        }
        "I" => match session.get_bbid() {
            Ok(bbid) => println!("I: bbid = 0x{bbid:08x}"),
            Err(e) => println!("I: error: {e}"),
        },
        "H" => match parse_u32(rest) {
            Ok(value) => report("H", session.set_led(value)),
            Err(_) => println!("H: invalid value {rest:?}"),
        },
        "S" => match session.sign_hash(Path::new(rest)) {
            Ok((hash, sig)) => {
                println!("S: hash   = {}", hex(&hash));
                println!("S: sig    = {}", hex(&sig));
            }
            Err(e) => println!("S: error: {e}"),
        },
        "J" => report("J", session.set_time()),
        "L" => match session.list_files() {
            Ok(files) => {
                for f in files {
                    println!("{:<12} {:>10} bytes  start={:04x}", f.name.to_string(), f.size, f.start_block);
                }
            }
            Err(e) => println!("L: error: {e}"),
        },
        "F" => report("F", session.dump_current_fs(Path::new("current_fs.bin"))),
        "1" => report("1", session.dump_nand(Path::new("nand.bin"), Path::new("spare.bin"))),
        "X" => match parse_u32(rest) {
            Ok(block) => report("X", session.read_single_block(block as u16)),
            Err(_) => println!("X: invalid block {rest:?}"),
        },
        "3" => match session.parse_filename(rest) {
            Ok(name) => report("3", session.read_file(&name)),
            Err(e) => println!("3: {e}"),
        },
        "C" => match session.stats() {
            Ok(s) => println!(
                "C: free={} used={} bad={} seqno={}",
                s.free_blocks, s.used_blocks, s.bad_blocks, s.seqno
            ),
            Err(e) => println!("C: error: {e}"),
        },
        "K" => match session.parse_filename(rest) {
            Ok(name) => match session.list_file_blocks(&name) {
                Ok(blocks) => {
                    let rendered: Vec<String> = blocks.iter().map(|b| format!("{b:04x}")).collect();
                    println!("K: {}", rendered.join(" -> "));
                }
                Err(e) => println!("K: error: {e}"),
            },
            Err(e) => println!("K: {e}"),
        },
        "h" => {
            println!("{HELP_TEXT}");
            #[cfg(feature = "write")]
            println!("{WRITE_HELP_TEXT}");
        }
        "?" => {
            println!("ique {} (write feature: {})", env!("CARGO_PKG_VERSION"), cfg!(feature = "write"));
            println!("connected: {}", session.is_connected());
        }
        "q" => return false,

        #[cfg(feature = "write")]
        "W" => {
            println!("This operation overwrites the area needed to boot your console.");
            println!("If you would like a safer NAND write, use the partial write command (2).");
            if confirm("Are you sure you want to write a FULL NAND to the player? (y/n): ") {
                report(
                    "W",
                    session.write_nand(Path::new("nand.bin"), Path::new("spare.bin"), WriteRange::FullNand),
                );
            } else {
                println!("W: write aborted");
            }
        }
        #[cfg(feature = "write")]
        "2" => report(
            "2",
            session.write_nand(Path::new("nand.bin"), Path::new("spare.bin"), WriteRange::PartialNand),
        ),
        #[cfg(feature = "write")]
        "Y" => match parse_u32(rest) {
            Ok(block) => {
                if confirm(&format!("Are you sure you wish to overwrite block 0x{block:04x}? (y/n): ")) {
                    report("Y", session.write_single_block(block as u16));
                } else {
                    println!("Y: write canceled");
                }
            }
            Err(_) => println!("Y: invalid block {rest:?}"),
        },
        #[cfg(feature = "write")]
        "4" => match session.parse_filename(rest) {
            Ok(name) => report("4", session.write_file(&name)),
            Err(e) => println!("4: {e}"),
        },
        #[cfg(feature = "write")]
        "R" => match session.parse_filename(rest) {
            Ok(name) => report("R", session.delete_file(&name)),
            Err(e) => println!("R: {e}"),
        },

        other => println!("unknown command {other:?}; try h for help"),
    }
    true
}

#[cfg(feature = "write")]
fn confirm(prompt: &str) -> bool {
    print!("{prompt}");
    let _ = io::stdout().flush();
    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line).is_err() {
        return false;
    }
    matches!(line.trim().chars().next(), Some('y') | Some('Y'))
}

fn report<E: std::fmt::Display>(verb: &str, result: Result<(), E>) {
    match result {
        Ok(()) => println!("{verb}: ok"),
        Err(e) => println!("{verb}: error: {e}"),
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
