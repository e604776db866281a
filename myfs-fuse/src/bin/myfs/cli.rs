use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "myfs", about = "Inspect and manipulate a myFS volume image")]
pub struct Cli {
    /// Backing file of the volume
    #[arg(long, short)]
    pub image: PathBuf,

    /// Account to act as (defaults to root)
    #[arg(long, short)]
    pub user: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create a fresh volume, overwriting the image
    Format {
        #[arg(long, default_value_t = 16)]
        size_mb: u32,
        #[arg(long, default_value_t = myfs::DEFAULT_BLOCK_SIZE_KB)]
        block_kb: u32,
        /// Root password
        #[arg(long)]
        password: String,
        /// Repeat of the root password
        #[arg(long)]
        confirm: String,
    },
    /// Volume summary
    Info,
    Ls {
        #[arg(default_value = ".")]
        path: String,
    },
    Mkdir {
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Create an empty file
    Touch { path: String },
    /// Replace a file's content with a host file, or stdin for `-`
    Write { path: String, source: String },
    Cat { path: String },
    Rm {
        #[arg(short = 'R')]
        recursive: bool,
        #[arg(required = true)]
        paths: Vec<String>,
    },
    Mv { src: String, dst: String },
    /// Hard link
    Ln { src: String, dst: String },
    Whereis { name: String },
    Stat { path: String },
    /// Two octal digits, e.g. `75`
    Chmod { mode: String, path: String },
    Chown {
        #[arg(short = 'R')]
        recursive: bool,
        user: String,
        path: String,
    },
    Chgrp {
        #[arg(short = 'R')]
        recursive: bool,
        group: String,
        path: String,
    },
    /// Pack every regular file of a host directory into the volume
    Import {
        host_dir: PathBuf,
        #[arg(long, default_value = "/")]
        to: String,
    },
}
