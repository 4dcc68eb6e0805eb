// SPDX-FileCopyrightText: Copyright © 2026 ique Developers
//
// SPDX-License-Identifier: GPL-3.0-or-later

use std::path::PathBuf;

use clap::Parser;

/// Host-side agent for iQue Player NAND flash and filesystem access.
#[derive(Parser, Debug)]
#[command(name = "ique", version, about)]
pub struct Cli {
    /// Read commands from this script file instead of stdin.
    #[arg(short = 'f', long = "script")]
    pub script: Option<PathBuf>,

    /// Append a trace of every USB transfer to this file.
    #[cfg(feature = "usb-log")]
    #[arg(short = 'l', long = "log-file")]
    pub usb_log: Option<PathBuf>,

    /// Increase diagnostic log verbosity (-v, -vv).
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn log_level(&self) -> log::LevelFilter {
        match self.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        }
    }
}
