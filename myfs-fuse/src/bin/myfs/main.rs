mod cli;

use std::io::{self, Write};
use std::process::ExitCode;

use clap::Parser;
use myfs::{DirectoryTree, FileSystem, FormatOptions, Perm, Result};
use myfs_fuse::{format_listing, format_stat, import_dir, read_source};

use self::cli::{Cli, Command};

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("myfs: {err}");
            ExitCode::FAILURE
        }
    }
}

/// `Ok(false)` when a batch command had failing items
fn run(cli: Cli) -> Result<bool> {
    if let Command::Format {
        size_mb,
        block_kb,
        password,
        confirm,
    } = &cli.command
    {
        let mut options = FormatOptions::new(*size_mb, *block_kb, password);
        options.confirm = confirm.clone();
        let fs = FileSystem::format(&cli.image, &options)?;
        print_info(&DirectoryTree::new(fs));
        return Ok(true);
    }

    let mut tree = DirectoryTree::new(FileSystem::mount(&cli.image)?);
    if let Some(user) = &cli.user {
        tree.login(user)?;
    }

    let ok = execute(&mut tree, cli.command)?;
    tree.unmount()?;

    Ok(ok)
}

fn execute(tree: &mut DirectoryTree, command: Command) -> Result<bool> {
    match command {
        Command::Format { .. } => unreachable!("handled before mounting"),
        Command::Info => print_info(tree),
        Command::Ls { path } => {
            for item in tree.list(&path)? {
                println!("{}", format_listing(&item));
            }
        }
        Command::Mkdir { names } => return Ok(report(&names, tree.mkdir(names.as_slice()))),
        Command::Touch { path } => {
            tree.create_file(&path, &[])?;
        }
        Command::Write { path, source } => {
            let data = read_source(&source)?;
            if tree.resolve(&path).is_ok() {
                tree.write_file(&path, &data)?;
            } else {
                tree.create_file(&path, &data)?;
            }
        }
        Command::Cat { path } => {
            let data = tree.read_file(&path)?;
            io::stdout().write_all(&data)?;
        }
        Command::Rm { recursive, paths } => {
            return Ok(report(&paths, tree.rm(paths.as_slice(), recursive)));
        }
        Command::Mv { src, dst } => tree.mv(&src, &dst)?,
        Command::Ln { src, dst } => tree.ln(&src, &dst)?,
        Command::Whereis { name } => {
            for path in tree.whereis(&name)? {
                println!("{path}");
            }
        }
        Command::Stat { path } => println!("{}", format_stat(&tree.stat(&path)?)),
        Command::Chmod { mode, path } => {
            tree.chmod(&mode, &path)?;
            println!("{path}: {}", Perm::render(tree.stat(&path)?.perms));
        }
        Command::Chown {
            recursive,
            user,
            path,
        } => tree.chown(&user, &path, recursive)?,
        Command::Chgrp {
            recursive,
            group,
            path,
        } => tree.chgrp(&group, &path, recursive)?,
        Command::Import { host_dir, to } => {
            for name in import_dir(tree, &host_dir, &to)? {
                println!("{name}");
            }
        }
    }

    Ok(true)
}

/// 逐项报告失败，其余照常
fn report<T>(items: &[String], results: Vec<Result<T>>) -> bool {
    let mut ok = true;
    for (item, result) in items.iter().zip(results) {
        if let Err(err) = result {
            eprintln!("myfs: {item}: {err}");
            ok = false;
        }
    }

    ok
}

fn print_info(tree: &DirectoryTree) {
    let info = tree.usage();
    println!("name:        {} v{}", info.name, info.version);
    println!("block size:  {} bytes ({:?})", info.block_size, info.allocation);
    println!(
        "blocks:      {} total, {} used, {} free",
        info.blocks.total, info.blocks.used, info.blocks.free
    );
    println!(
        "inodes:      {} total, {} used, {} free",
        info.inodes.total, info.inodes.used, info.inodes.free
    );
    println!("accounts:    {} users, {} groups", info.users, info.groups);
    println!("cwd:         {} (uid {})", tree.cwd(), tree.user().uid);
}
